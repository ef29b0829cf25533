// group-core/src/group/keys.rs

//! Store key layout derived from the base key.

/// Every key the coordinator touches, derived from one base key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeys {
    base: String,
    ping: String,
    purge_pattern: String,
}

impl GroupKeys {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let ping = format!("{}-PING", base);
        let purge_pattern = format!("{}.*", escape_glob(&base));
        Self {
            base,
            ping,
            purge_pattern,
        }
    }

    /// Key holding the current leader id.
    pub fn leader(&self) -> &str {
        &self.base
    }

    /// Key whose presence means the leader is heartbeating.
    pub fn ping(&self) -> &str {
        &self.ping
    }

    /// Membership set key for `name`.
    pub fn group(&self, name: &str) -> String {
        format!("{}.{}", self.base, name)
    }

    /// Glob matching every membership set under the base key.
    pub fn purge_pattern(&self) -> &str {
        &self.purge_pattern
    }
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
