use std::fmt;

use rand::Rng;

use crate::signaling::error::SignalingError;

const MAX_ROOM_HASH_LEN: usize = 16;

/// 通话房间标识，即分享链接中 `#` 之后的十六进制串。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// 生成随机的 24 位十六进制房间号。
    pub fn generate() -> Self {
        let value: u32 = rand::thread_rng().gen_range(0..=0x00FF_FFFF);
        Self(format!("{value:x}"))
    }

    pub fn parse(raw: &str) -> Result<Self, SignalingError> {
        let trimmed = raw.trim().trim_start_matches('#');
        if trimmed.is_empty()
            || trimmed.len() > MAX_ROOM_HASH_LEN
            || !trimmed.chars().all(|ch| ch.is_ascii_hexdigit())
        {
            return Err(SignalingError::InvalidRoom(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 中继上的房间名。
    pub fn room_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }

    pub fn share_link(&self, base_url: &str) -> String {
        let base = base_url.split('#').next().unwrap_or(base_url);
        format!("{base}#{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_hex() {
        for _ in 0..64 {
            let room = RoomId::generate();
            assert!(!room.as_str().is_empty());
            assert!(room.as_str().len() <= 6);
            assert!(RoomId::parse(room.as_str()).is_ok());
        }
    }

    #[test]
    fn parse_accepts_fragment_and_normalizes_case() {
        let room = RoomId::parse("#A1b2C3").expect("valid hash");
        assert_eq!(room.as_str(), "a1b2c3");
        assert_eq!(room.room_name("observable-"), "observable-a1b2c3");
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(matches!(
            RoomId::parse("not-a-room"),
            Err(SignalingError::InvalidRoom(_))
        ));
        assert!(RoomId::parse("").is_err());
    }

    #[test]
    fn share_link_replaces_existing_fragment() {
        let room = RoomId::parse("beef").expect("valid hash");
        assert_eq!(
            room.share_link("http://localhost:3000/#old"),
            "http://localhost:3000/#beef"
        );
    }
}
