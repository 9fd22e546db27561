use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

// CTCAE v5.0 grade names.
str_enum!(AdverseEventGrade {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
    LifeThreatening => "life_threatening",
    Death => "death",
});

str_enum!(InsightSeverity {
    Safety => "SAFETY",
    Signal => "SIGNAL",
    Opportunity => "OPPORTUNITY",
    Review => "REVIEW",
});

impl InsightSeverity {
    /// Display rank: lower sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Safety => 0,
            Self::Signal => 1,
            Self::Opportunity => 2,
            Self::Review => 3,
        }
    }
}

str_enum!(FlagTier {
    Absolute => "ABSOLUTE",
    Relative => "RELATIVE",
});

str_enum!(ContraindicationCategory {
    Medication => "MEDICATION",
    Psychiatric => "PSYCHIATRIC",
    Cardiovascular => "CARDIOVASCULAR",
    Demographic => "DEMOGRAPHIC",
    Assessment => "ASSESSMENT",
});

str_enum!(Verdict {
    Clear => "CLEAR",
    ProceedWithCaution => "PROCEED_WITH_CAUTION",
    Blocked => "BLOCKED",
});
