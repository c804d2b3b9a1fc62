use serde::Serialize;

/// Capability codes granted to one user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|granted| granted == code)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Permissions(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include() {
        let permissions: Permissions = ["movies:read"].into_iter().collect();
        assert!(permissions.include("movies:read"));
        assert!(!permissions.include("movies:write"));
        assert!(!Permissions::default().include("movies:read"));
    }
}
