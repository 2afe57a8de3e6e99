//! Creativity technique library for divergence rounds.
//!
//! Odd rounds draw from the generative family and even rounds from the
//! transformative family. Each family is walked in order and wraps around.

use serde::{Deserialize, Serialize};

/// Technique family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueFamily {
    /// Produces new starting points.
    Generative,
    /// Reshapes existing ideas.
    Transformative,
}

impl std::fmt::Display for TechniqueFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generative => write!(f, "generative"),
            Self::Transformative => write!(f, "transformative"),
        }
    }
}

/// A named prompting technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technique {
    pub name: String,
    pub family: TechniqueFamily,
    pub instruction: String,
}

impl Technique {
    pub fn new(name: &str, family: TechniqueFamily, instruction: &str) -> Self {
        Self {
            name: name.to_string(),
            family,
            instruction: instruction.to_string(),
        }
    }
}

/// Two ordered technique families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueLibrary {
    pub generative: Vec<Technique>,
    pub transformative: Vec<Technique>,
}

impl TechniqueLibrary {
    /// Technique for a 1-indexed round. `None` only if the family is empty.
    pub fn for_round(&self, round: u32) -> Option<&Technique> {
        let round = round.max(1);
        let family = if round % 2 == 1 {
            &self.generative
        } else {
            &self.transformative
        };
        if family.is_empty() {
            return None;
        }
        let ordinal = ((round - 1) / 2) as usize;
        family.get(ordinal % family.len())
    }

    pub fn len(&self) -> usize {
        self.generative.len() + self.transformative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TechniqueLibrary {
    fn default() -> Self {
        use TechniqueFamily::{Generative, Transformative};
        Self {
            generative: vec![
                Technique::new(
                    "reverse_assumptions",
                    Generative,
                    "List the assumptions everyone makes about this topic, invert one, and build an idea on the inverted assumption.",
                ),
                Technique::new(
                    "analogical_transfer",
                    Generative,
                    "Pick a field unrelated to this topic, find a mechanism that works well there, and transplant it here.",
                ),
                Technique::new(
                    "random_stimulus",
                    Generative,
                    "Take an arbitrary everyday object as a stimulus and force a connection between it and the topic.",
                ),
                Technique::new(
                    "what_if",
                    Generative,
                    "Ask 'what if' the main constraint were ten times larger or disappeared entirely, and follow the consequence.",
                ),
            ],
            transformative: vec![
                Technique::new(
                    "scamper",
                    Transformative,
                    "Apply one SCAMPER move (substitute, combine, adapt, modify, put to other use, eliminate, reverse) to an existing idea.",
                ),
                Technique::new(
                    "six_thinking_hats",
                    Transformative,
                    "Examine the strongest existing idea through one hat (facts, feelings, risks, benefits, creativity, process) and improve it.",
                ),
                Technique::new(
                    "first_principles",
                    Transformative,
                    "Break the problem down to fundamental truths and rebuild a solution from them without relying on precedent.",
                ),
                Technique::new(
                    "constraint_removal",
                    Transformative,
                    "Remove the most limiting constraint of an existing idea and describe what it becomes.",
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families_alternate() {
        let library = TechniqueLibrary::default();
        for round in 1..=8 {
            let technique = library.for_round(round).unwrap();
            let expected = if round % 2 == 1 {
                TechniqueFamily::Generative
            } else {
                TechniqueFamily::Transformative
            };
            assert_eq!(technique.family, expected, "round {round}");
        }
    }

    #[test]
    fn test_walks_family_in_order() {
        let library = TechniqueLibrary::default();
        assert_eq!(library.for_round(1).unwrap().name, "reverse_assumptions");
        assert_eq!(library.for_round(2).unwrap().name, "scamper");
        assert_eq!(library.for_round(3).unwrap().name, "analogical_transfer");
        assert_eq!(library.for_round(4).unwrap().name, "six_thinking_hats");
    }

    #[test]
    fn test_wraps_past_library_size() {
        let library = TechniqueLibrary::default();
        // Round 9 is the fifth generative pick → wraps to the first.
        assert_eq!(library.for_round(9), library.for_round(1));
        assert_eq!(library.for_round(10), library.for_round(2));
        assert!(library.for_round(1_000).is_some());
    }

    #[test]
    fn test_round_zero_treated_as_first() {
        let library = TechniqueLibrary::default();
        assert_eq!(library.for_round(0), library.for_round(1));
    }

    #[test]
    fn test_empty_family() {
        let library = TechniqueLibrary {
            generative: vec![],
            transformative: TechniqueLibrary::default().transformative,
        };
        assert!(library.for_round(1).is_none());
        assert!(library.for_round(2).is_some());
    }
}
