/// 协商状态机的阶段划分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    RoleAssigned,
    Negotiating,
    Connected,
    Closed,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Idle => "idle",
            NegotiationState::RoleAssigned => "role_assigned",
            NegotiationState::Negotiating => "negotiating",
            NegotiationState::Connected => "connected",
            NegotiationState::Closed => "closed",
        }
    }

    /// 是否已持有对端连接。
    pub fn has_connection(&self) -> bool {
        matches!(
            self,
            NegotiationState::Negotiating | NegotiationState::Connected
        )
    }

    /// 状态迁移表；不允许的迁移返回 `None`。
    pub fn next(self, trigger: Trigger) -> Option<NegotiationState> {
        use NegotiationState::*;

        match (self, trigger) {
            (Idle, Trigger::MembersReady) => Some(RoleAssigned),
            (RoleAssigned, Trigger::ConnectionCreated) => Some(Negotiating),
            (Negotiating, Trigger::RemoteTrack) => Some(Connected),
            (Closed, Trigger::Close) => None,
            (_, Trigger::Close) => Some(Closed),
            _ => None,
        }
    }
}

/// 驱动状态迁移的触发条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    MembersReady,
    ConnectionCreated,
    RemoteTrack,
    Close,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::MembersReady => "members_ready",
            Trigger::ConnectionCreated => "connection_created",
            Trigger::RemoteTrack => "remote_track",
            Trigger::Close => "close",
        }
    }
}

/// 双人协商中的本端角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Offerer => "offerer",
            Role::Answerer => "answerer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_follows_table() {
        let state = NegotiationState::Idle;
        let state = state.next(Trigger::MembersReady).expect("idle -> role assigned");
        let state = state
            .next(Trigger::ConnectionCreated)
            .expect("role assigned -> negotiating");
        let state = state.next(Trigger::RemoteTrack).expect("negotiating -> connected");
        assert_eq!(state, NegotiationState::Connected);
        assert_eq!(state.next(Trigger::Close), Some(NegotiationState::Closed));
    }

    #[test]
    fn rejects_out_of_order_triggers() {
        assert_eq!(NegotiationState::Idle.next(Trigger::RemoteTrack), None);
        assert_eq!(NegotiationState::Idle.next(Trigger::ConnectionCreated), None);
        assert_eq!(NegotiationState::Connected.next(Trigger::MembersReady), None);
        assert_eq!(NegotiationState::Closed.next(Trigger::MembersReady), None);
    }

    #[test]
    fn close_is_allowed_from_every_open_state() {
        for state in [
            NegotiationState::Idle,
            NegotiationState::RoleAssigned,
            NegotiationState::Negotiating,
            NegotiationState::Connected,
        ] {
            assert_eq!(state.next(Trigger::Close), Some(NegotiationState::Closed));
        }
        assert_eq!(NegotiationState::Closed.next(Trigger::Close), None);
    }
}
