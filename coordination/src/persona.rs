//! Debate personas — named roles with a closed four-axis personality.
//!
//! Every personality is one variant from each of four small enums, so prompt
//! assembly is an exhaustive match rather than a free-form lookup.
//!
//! # Axes
//!
//! - **Thinking**: analytical, intuitive, systems, critical
//! - **Decision**: data-driven, consensus-seeking, decisive, cautious
//! - **Communication**: concise, narrative, socratic, technical
//! - **Action**: experimental, methodical, pragmatic, visionary

use serde::{Deserialize, Serialize};

/// How a persona reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingStyle {
    Analytical,
    Intuitive,
    Systems,
    Critical,
}

impl ThinkingStyle {
    fn fragment(self) -> &'static str {
        match self {
            Self::Analytical => "You break problems into parts and reason step by step.",
            Self::Intuitive => "You trust pattern recognition and leap to non-obvious connections.",
            Self::Systems => "You look at feedback loops, dependencies and second-order effects.",
            Self::Critical => "You probe for weaknesses, hidden assumptions and failure modes.",
        }
    }
}

/// How a persona commits to a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStyle {
    DataDriven,
    ConsensusSeeking,
    Decisive,
    Cautious,
}

impl DecisionStyle {
    fn fragment(self) -> &'static str {
        match self {
            Self::DataDriven => "You decide from evidence and ask what would change your mind.",
            Self::ConsensusSeeking => "You look for the option most of the group can support.",
            Self::Decisive => "You commit quickly to the strongest option and say so plainly.",
            Self::Cautious => "You prefer reversible steps and flag irreversible risks.",
        }
    }
}

/// How a persona writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    Concise,
    Narrative,
    Socratic,
    Technical,
}

impl CommunicationStyle {
    fn fragment(self) -> &'static str {
        match self {
            Self::Concise => "Write briefly; prefer bullet points over prose.",
            Self::Narrative => "Explain through a short user story or scenario.",
            Self::Socratic => "Surface the key question behind each point you make.",
            Self::Technical => "Be precise about mechanisms, interfaces and data flow.",
        }
    }
}

/// How a persona prefers to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStyle {
    Experimental,
    Methodical,
    Pragmatic,
    Visionary,
}

impl ActionStyle {
    fn fragment(self) -> &'static str {
        match self {
            Self::Experimental => "Favor small experiments that produce learning fast.",
            Self::Methodical => "Favor ordered, well-scoped steps with clear checkpoints.",
            Self::Pragmatic => "Favor whatever ships value soonest with the least effort.",
            Self::Visionary => "Favor bold directions that could redefine the problem.",
        }
    }
}

/// One variant per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Personality {
    pub thinking: ThinkingStyle,
    pub decision: DecisionStyle,
    pub communication: CommunicationStyle,
    pub action: ActionStyle,
}

impl Personality {
    pub fn new(
        thinking: ThinkingStyle,
        decision: DecisionStyle,
        communication: CommunicationStyle,
        action: ActionStyle,
    ) -> Self {
        Self {
            thinking,
            decision,
            communication,
            action,
        }
    }

    /// Prompt text describing this personality.
    pub fn prompt_fragment(&self) -> String {
        [
            self.thinking.fragment(),
            self.decision.fragment(),
            self.communication.fragment(),
            self.action.fragment(),
        ]
        .join(" ")
    }
}

/// A named debate participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    pub personality: Personality,
}

impl Persona {
    pub fn new(id: &str, name: &str, role: &str, personality: Personality) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            expertise: Vec::new(),
            personality,
        }
    }

    pub fn with_expertise(mut self, tags: &[&str]) -> Self {
        self.expertise = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// System prompt identifying the persona.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}, {}.", self.name, self.role);
        if !self.expertise.is_empty() {
            prompt.push_str(&format!(" Your expertise: {}.", self.expertise.join(", ")));
        }
        prompt.push(' ');
        prompt.push_str(&self.personality.prompt_fragment());
        prompt
    }
}

/// The built-in roster of eight personas.
pub fn default_roster() -> Vec<Persona> {
    use ActionStyle as A;
    use CommunicationStyle as C;
    use DecisionStyle as D;
    use ThinkingStyle as T;

    vec![
        Persona::new(
            "visionary",
            "The Visionary",
            "a product strategist who imagines where the field is heading",
            Personality::new(T::Intuitive, D::Decisive, C::Narrative, A::Visionary),
        )
        .with_expertise(&["product strategy", "market trends"]),
        Persona::new(
            "engineer",
            "The Engineer",
            "a senior systems engineer who has to build whatever is decided",
            Personality::new(T::Analytical, D::DataDriven, C::Technical, A::Methodical),
        )
        .with_expertise(&["distributed systems", "performance"]),
        Persona::new(
            "skeptic",
            "The Skeptic",
            "a reviewer who stress-tests every proposal",
            Personality::new(T::Critical, D::Cautious, C::Socratic, A::Methodical),
        )
        .with_expertise(&["risk analysis", "security"]),
        Persona::new(
            "user_advocate",
            "The User Advocate",
            "a designer who speaks for the people using the product",
            Personality::new(T::Intuitive, D::ConsensusSeeking, C::Narrative, A::Pragmatic),
        )
        .with_expertise(&["user research", "developer experience"]),
        Persona::new(
            "hacker",
            "The Hacker",
            "a prototyper who would rather try it than talk about it",
            Personality::new(T::Intuitive, D::Decisive, C::Concise, A::Experimental),
        )
        .with_expertise(&["rapid prototyping", "open source"]),
        Persona::new(
            "analyst",
            "The Analyst",
            "a data analyst who quantifies opportunities",
            Personality::new(T::Analytical, D::DataDriven, C::Concise, A::Pragmatic),
        )
        .with_expertise(&["metrics", "ecosystem analysis"]),
        Persona::new(
            "architect",
            "The Architect",
            "a platform architect who thinks in long-lived structures",
            Personality::new(T::Systems, D::Cautious, C::Technical, A::Methodical),
        )
        .with_expertise(&["architecture", "api design"]),
        Persona::new(
            "operator",
            "The Operator",
            "an operations lead who owns reliability after launch",
            Personality::new(T::Systems, D::ConsensusSeeking, C::Concise, A::Pragmatic),
        )
        .with_expertise(&["operations", "cost control"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_roster_has_unique_ids() {
        let roster = default_roster();
        assert_eq!(roster.len(), 8);
        let ids: HashSet<&str> = roster.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_system_prompt_mentions_name_and_expertise() {
        let roster = default_roster();
        let skeptic = roster.iter().find(|p| p.id == "skeptic").unwrap();
        let prompt = skeptic.system_prompt();
        assert!(prompt.starts_with("You are The Skeptic"));
        assert!(prompt.contains("risk analysis"));
        assert!(prompt.contains("weaknesses"));
    }

    #[test]
    fn test_personality_fragment_covers_all_axes() {
        let p = Personality::new(
            ThinkingStyle::Systems,
            DecisionStyle::Cautious,
            CommunicationStyle::Socratic,
            ActionStyle::Experimental,
        );
        let fragment = p.prompt_fragment();
        assert!(fragment.contains("feedback loops"));
        assert!(fragment.contains("reversible"));
        assert!(fragment.contains("key question"));
        assert!(fragment.contains("experiments"));
    }

    #[test]
    fn test_personality_serde() {
        let json = serde_json::to_string(&default_roster()[0].personality).unwrap();
        assert!(json.contains("\"intuitive\""));
        let parsed: Personality = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, default_roster()[0].personality);
    }
}
