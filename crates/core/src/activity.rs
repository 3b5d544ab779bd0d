//! Activity content: the structured objects the generator asks models for.
//!
//! Every activity is one variant of [`ActivityContent`], discriminated by an
//! explicit `type` field. Each [`ActivityKind`] publishes the JSON schema sent
//! to the provider; validation is deserialization into the variant followed by
//! per-variant semantic checks.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::GenerationError;
use crate::provider::ResponseSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Mcq,
    Flashcards,
    CodingChallenge,
    SystemDesign,
    ConceptExplanation,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        Self::Mcq,
        Self::Flashcards,
        Self::CodingChallenge,
        Self::SystemDesign,
        Self::ConceptExplanation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mcq => "mcq",
            Self::Flashcards => "flashcards",
            Self::CodingChallenge => "coding_challenge",
            Self::SystemDesign => "system_design",
            Self::ConceptExplanation => "concept_explanation",
        }
    }

    /// Task id used for tier resolution and audit records.
    pub fn task(&self) -> &'static str {
        match self {
            Self::Mcq => "generate_mcq_activity",
            Self::Flashcards => "generate_flashcards",
            Self::CodingChallenge => "generate_coding_challenge",
            Self::SystemDesign => "generate_system_design",
            Self::ConceptExplanation => "explain_concept",
        }
    }

    /// JSON schema for this kind's payload (the `type` tag included).
    pub fn schema(&self) -> Value {
        let (properties, required) = match self {
            Self::Mcq => (
                json!({
                    "title": { "type": "string" },
                    "questions": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "question": { "type": "string" },
                                "options": { "type": "array", "items": { "type": "string" }, "minItems": 2 },
                                "answer_index": { "type": "integer", "minimum": 0 },
                                "explanation": { "type": "string" }
                            },
                            "required": ["question", "options", "answer_index", "explanation"]
                        }
                    }
                }),
                vec!["title", "questions"],
            ),
            Self::Flashcards => (
                json!({
                    "title": { "type": "string" },
                    "cards": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "front": { "type": "string" },
                                "back": { "type": "string" }
                            },
                            "required": ["front", "back"]
                        }
                    }
                }),
                vec!["title", "cards"],
            ),
            Self::CodingChallenge => (
                json!({
                    "title": { "type": "string" },
                    "prompt": { "type": "string" },
                    "difficulty": { "type": "string", "enum": ["easy", "medium", "hard"] },
                    "starter_code": { "type": "string" },
                    "test_cases": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "input": { "type": "string" },
                                "expected_output": { "type": "string" }
                            },
                            "required": ["input", "expected_output"]
                        }
                    },
                    "hints": { "type": "array", "items": { "type": "string" } }
                }),
                vec!["title", "prompt", "difficulty", "test_cases"],
            ),
            Self::SystemDesign => (
                json!({
                    "title": { "type": "string" },
                    "problem": { "type": "string" },
                    "requirements": { "type": "array", "items": { "type": "string" } },
                    "components": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "responsibility": { "type": "string" }
                            },
                            "required": ["name", "responsibility"]
                        }
                    },
                    "tradeoffs": { "type": "array", "items": { "type": "string" } }
                }),
                vec!["title", "problem", "requirements", "components"],
            ),
            Self::ConceptExplanation => (
                json!({
                    "title": { "type": "string" },
                    "summary": { "type": "string" },
                    "sections": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "heading": { "type": "string" },
                                "body": { "type": "string" }
                            },
                            "required": ["heading", "body"]
                        }
                    },
                    "key_points": { "type": "array", "items": { "type": "string" } }
                }),
                vec!["title", "summary", "sections"],
            ),
        };

        let mut properties = properties;
        if let Some(map) = properties.as_object_mut() {
            map.insert("type".into(), json!({ "type": "string", "const": self.as_str() }));
        }
        let mut required: Vec<&str> = required;
        required.insert(0, "type");

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn response_schema(&self) -> ResponseSchema {
        ResponseSchema {
            name: self.as_str().to_string(),
            schema: self.schema(),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown activity type '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignComponent {
    pub name: String,
    pub responsibility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationSection {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityContent {
    Mcq {
        title: String,
        questions: Vec<McqQuestion>,
    },
    Flashcards {
        title: String,
        cards: Vec<Flashcard>,
    },
    CodingChallenge {
        title: String,
        prompt: String,
        difficulty: String,
        #[serde(default)]
        starter_code: String,
        test_cases: Vec<TestCase>,
        #[serde(default)]
        hints: Vec<String>,
    },
    SystemDesign {
        title: String,
        problem: String,
        requirements: Vec<String>,
        components: Vec<DesignComponent>,
        #[serde(default)]
        tradeoffs: Vec<String>,
    },
    ConceptExplanation {
        title: String,
        summary: String,
        sections: Vec<ExplanationSection>,
        #[serde(default)]
        key_points: Vec<String>,
    },
}

impl ActivityContent {
    pub fn kind(&self) -> ActivityKind {
        match self {
            Self::Mcq { .. } => ActivityKind::Mcq,
            Self::Flashcards { .. } => ActivityKind::Flashcards,
            Self::CodingChallenge { .. } => ActivityKind::CodingChallenge,
            Self::SystemDesign { .. } => ActivityKind::SystemDesign,
            Self::ConceptExplanation { .. } => ActivityKind::ConceptExplanation,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Mcq { title, .. }
            | Self::Flashcards { title, .. }
            | Self::CodingChallenge { title, .. }
            | Self::SystemDesign { title, .. }
            | Self::ConceptExplanation { title, .. } => title,
        }
    }

    /// Parse a model-produced object as `kind`.
    ///
    /// Models often omit the discriminator, so a missing `type` is filled in;
    /// a present but different one is a validation failure.
    pub fn parse(kind: ActivityKind, value: Value) -> Result<Self, GenerationError> {
        let invalid = |reason: String| GenerationError::SchemaValidation {
            schema: kind.as_str().to_string(),
            reason,
        };

        let mut value = value;
        let Some(object) = value.as_object_mut() else {
            return Err(invalid("expected a JSON object".into()));
        };
        match object.get("type").and_then(Value::as_str) {
            Some(tag) if tag != kind.as_str() => {
                return Err(invalid(format!("type is '{tag}'")));
            }
            Some(_) => {}
            None => {
                object.insert("type".into(), Value::String(kind.as_str().into()));
            }
        }

        let content: ActivityContent =
            serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        content.validate()?;
        Ok(content)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let invalid = |reason: String| {
            Err(GenerationError::SchemaValidation {
                schema: self.kind().as_str().to_string(),
                reason,
            })
        };

        if self.title().trim().is_empty() {
            return invalid("title is empty".into());
        }

        match self {
            Self::Mcq { questions, .. } => {
                if questions.is_empty() {
                    return invalid("no questions".into());
                }
                for (i, q) in questions.iter().enumerate() {
                    if q.options.len() < 2 {
                        return invalid(format!("question {i} has fewer than two options"));
                    }
                    if q.answer_index >= q.options.len() {
                        return invalid(format!(
                            "question {i} answer_index {} is out of range for {} options",
                            q.answer_index,
                            q.options.len()
                        ));
                    }
                }
            }
            Self::Flashcards { cards, .. } => {
                if cards.is_empty() {
                    return invalid("no cards".into());
                }
                if let Some(i) = cards.iter().position(|c| c.front.trim().is_empty()) {
                    return invalid(format!("card {i} has an empty front"));
                }
            }
            Self::CodingChallenge { difficulty, .. } => {
                if !matches!(difficulty.as_str(), "easy" | "medium" | "hard") {
                    return invalid(format!("unknown difficulty '{difficulty}'"));
                }
            }
            Self::SystemDesign { components, .. } => {
                if components.is_empty() {
                    return invalid("no components".into());
                }
            }
            Self::ConceptExplanation { summary, .. } => {
                if summary.trim().is_empty() {
                    return invalid("summary is empty".into());
                }
            }
        }
        Ok(())
    }
}
