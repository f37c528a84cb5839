//! 进程内中继，实现与托管中继服务相同的房间语义。
//!
//! 发布的消息会回送给发送方本身，由 [`RelayInbox`] 负责过滤。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::signaling::channel::{RelayInbox, RelayTransport};

#[derive(Default)]
struct HubState {
    next_client: u64,
    offline: bool,
    rooms: HashMap<String, Vec<Subscriber>>,
}

struct Subscriber {
    client_id: String,
    inbox: RelayInbox,
}

impl HubState {
    fn broadcast_members(&self, room: &str) {
        if let Some(subscribers) = self.rooms.get(room) {
            let members: Vec<String> = subscribers
                .iter()
                .map(|subscriber| subscriber.client_id.clone())
                .collect();
            for subscriber in subscribers {
                subscriber.inbox.deliver_members(members.clone());
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct LocalRelayHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalRelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) -> LocalRelay {
        LocalRelay {
            hub: self.clone(),
            client_id: Mutex::new(None),
        }
    }

    /// 模拟中继不可达，之后的 `open` 都会失败。
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn members(&self, room: &str) -> Vec<String> {
        self.lock()
            .rooms
            .get(room)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .map(|subscriber| subscriber.client_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 向房间内所有订阅者报告通道错误。
    pub fn fail_room(&self, room: &str, reason: &str) {
        let state = self.lock();
        if let Some(subscribers) = state.rooms.get(room) {
            for subscriber in subscribers {
                subscriber.inbox.deliver_error(reason);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(target: "signaling", "local relay state lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// 连接到 [`LocalRelayHub`] 的单个客户端。
pub struct LocalRelay {
    hub: LocalRelayHub,
    client_id: Mutex<Option<String>>,
}

impl LocalRelay {
    fn current_id(&self) -> Option<String> {
        match self.client_id.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl RelayTransport for LocalRelay {
    async fn open(&self) -> Result<String> {
        let client_id = {
            let mut state = self.hub.lock();
            if state.offline {
                return Err(anyhow!("relay offline"));
            }
            state.next_client += 1;
            format!("client-{}", state.next_client)
        };

        match self.client_id.lock() {
            Ok(mut guard) => *guard = Some(client_id.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(client_id.clone()),
        }
        Ok(client_id)
    }

    async fn subscribe(&self, room: &str, inbox: RelayInbox) -> Result<()> {
        let client_id = self
            .current_id()
            .ok_or_else(|| anyhow!("relay connection not open"))?;

        let mut state = self.hub.lock();
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .push(Subscriber { client_id, inbox });
        state.broadcast_members(room);
        Ok(())
    }

    fn publish(&self, room: &str, payload: Value) -> Result<()> {
        let client_id = self
            .current_id()
            .ok_or_else(|| anyhow!("relay connection not open"))?;

        let state = self.hub.lock();
        let subscribers = state
            .rooms
            .get(room)
            .ok_or_else(|| anyhow!("room {room} has no subscribers"))?;
        for subscriber in subscribers {
            subscriber.inbox.deliver_data(payload.clone(), &client_id);
        }
        Ok(())
    }

    fn close(&self) {
        let Some(client_id) = self.current_id() else {
            return;
        };

        let mut state = self.hub.lock();
        let mut touched = Vec::new();
        for (room, subscribers) in state.rooms.iter_mut() {
            let before = subscribers.len();
            subscribers.retain(|subscriber| subscriber.client_id != client_id);
            if subscribers.len() != before {
                touched.push(room.clone());
            }
        }
        state.rooms.retain(|_, subscribers| !subscribers.is_empty());
        for room in touched {
            state.broadcast_members(&room);
        }
    }
}
