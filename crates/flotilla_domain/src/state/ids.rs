use rand::Rng as _;
use std::fmt;

/// Opaque, unique workstream identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct WorkstreamId(String);

impl WorkstreamId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let raw: u64 = rng.r#gen();
        Self(format!("ws-{raw:016x}"))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
