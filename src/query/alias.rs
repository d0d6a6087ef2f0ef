/// Maps logical column names to collision-safe identifiers and back.
///
/// An alias is the logical name with a fixed prefix, so the mapping needs
/// no state and `unapply(apply(x)) == x` for every `x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMaker {
    prefix: String,
}

impl AliasMaker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn apply(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Strip the alias prefix; names that were never aliased come back unchanged
    pub fn unapply<'a>(&self, alias: &'a str) -> &'a str {
        alias.strip_prefix(self.prefix.as_str()).unwrap_or(alias)
    }
}

impl Default for AliasMaker {
    fn default() -> Self {
        Self::new("__")
    }
}
