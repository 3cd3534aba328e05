//! Closed vocabularies shared by the persistence rows and the HTTP layer.
//!
//! Columns store the upper-case names (`ADMIN`, `WITHDRAWN`, ...), the same
//! strings the API accepts and returns.

use serde::{Deserialize, Serialize};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", $label, s)),
                }
            }
        }
    };
}

string_enum!(
    /// Role carried in the access token and checked by the access policy.
    Role, "role" {
        Admin => "ADMIN",
        Designer => "DESIGNER",
        Developer => "DEVELOPER",
        Contractor => "CONTRACTOR",
        Customer => "CUSTOMER",
    }
);

string_enum!(
    /// Lifecycle of users, companies, projects and comments.
    CommonStatus, "status" {
        Created => "CREATED",
        Updated => "UPDATED",
        Deleted => "DELETED",
    }
);

string_enum!(
    /// Lifecycle of project docs and as-built docs.
    DocStatus, "document status" {
        Initial => "INITIAL",
        Revised => "REVISED",
        Corrected => "CORRECTED",
        Checked => "CHECKED",
        Approved => "APPROVED",
        Note => "NOTE",
        Withdrawn => "WITHDRAWN",
    }
);

string_enum!(
    DesignCategory, "design category" {
        Architectural => "ARCHITECTURAL",
        Structural => "STRUCTURAL",
        Mechanical => "MECHANICAL",
        Electrical => "ELECTRICAL",
        Plumbing => "PLUMBING",
        FireProtection => "FIRE_PROTECTION",
        Civil => "CIVIL",
        Other => "OTHER",
    }
);

string_enum!(
    AsbuiltCategory, "as-built category" {
        ExecutiveScheme => "EXECUTIVE_SCHEME",
        HiddenWorksAct => "HIDDEN_WORKS_ACT",
        TestReport => "TEST_REPORT",
        Certificate => "CERTIFICATE",
        Measurement => "MEASUREMENT",
        Photo => "PHOTO",
        Other => "OTHER",
    }
);

impl CommonStatus {
    pub const TERMINAL: CommonStatus = CommonStatus::Deleted;

    pub fn is_terminal(&self) -> bool {
        *self == Self::TERMINAL
    }
}

impl DocStatus {
    pub const TERMINAL: DocStatus = DocStatus::Withdrawn;

    pub fn is_terminal(&self) -> bool {
        *self == Self::TERMINAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("designer".parse::<Role>().unwrap(), Role::Designer);
        assert_eq!(" Withdrawn ".parse::<DocStatus>().unwrap(), DocStatus::Withdrawn);
        assert_eq!(
            "fire_protection".parse::<DesignCategory>().unwrap(),
            DesignCategory::FireProtection
        );
    }

    #[test]
    fn rejects_unknown_values() {
        let err = "ARCHITECT".parse::<Role>().unwrap_err();
        assert_eq!(err, "Invalid role: ARCHITECT");
        assert!("SHREDDED".parse::<DocStatus>().is_err());
    }

    #[test]
    fn serde_names_match_column_values() {
        for category in AsbuiltCategory::ALL {
            let json = serde_json::to_string(category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
        let status: DocStatus = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(status, DocStatus::Approved);
    }

    #[test]
    fn only_withdrawn_and_deleted_are_terminal() {
        let terminal: Vec<_> = DocStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![&DocStatus::Withdrawn]);
        assert!(CommonStatus::Deleted.is_terminal());
        assert!(!CommonStatus::Updated.is_terminal());
    }
}
