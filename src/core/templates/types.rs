use crate::core::store::types::CardType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Glossary,
    Fact,
    Transcript,
}

impl MatchSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchSource::Glossary => "glossary",
            MatchSource::Fact => "fact",
            MatchSource::Transcript => "transcript",
        }
    }

    pub fn from_source(value: &str) -> Option<Self> {
        match value {
            "glossary" => Some(MatchSource::Glossary),
            "fact" => Some(MatchSource::Fact),
            "transcript" => Some(MatchSource::Transcript),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
}

/// The volatile input describing why a card-emission opportunity exists.
/// Produced by the transcript handler, consumed once by the selection pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TriggerContext {
    pub concept_id: String,
    pub concept_label: String,
    pub match_source: MatchSource,
    #[serde(default)]
    pub supporting_facts: Vec<String>,
    #[serde(default)]
    pub prior_card_ids: Vec<String>,
    #[serde(default)]
    pub glossary_matches: Vec<GlossaryEntry>,
    #[serde(default)]
    pub context_bullets: Vec<String>,
    #[serde(default)]
    pub transcript_chunks: Vec<String>,
}

impl TriggerContext {
    /// Selection sits on the hot path of live processing; a malformed
    /// context must degrade to "no selection" instead of propagating.
    pub fn is_well_formed(&self) -> bool {
        !self.concept_id.trim().is_empty() && !self.concept_label.trim().is_empty()
    }

    pub fn label_word_count(&self) -> usize {
        self.concept_label.split_whitespace().count()
    }
}

#[derive(Debug, Clone)]
pub struct Eligibility {
    pub eligible: bool,
    pub priority: Option<i64>,
    pub reason: String,
}

impl Eligibility {
    pub fn no(reason: &str) -> Self {
        Self {
            eligible: false,
            priority: None,
            reason: reason.to_string(),
        }
    }

    pub fn yes(priority: i64, reason: &str) -> Self {
        Self {
            eligible: true,
            priority: Some(priority),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStrategy {
    Definition,
    Synthesis,
    Caption,
    VisualPrompt,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SlotSpec {
    pub id: &'static str,
    pub required: bool,
    pub strategy: ContentStrategy,
    pub max_len: usize,
    pub markdown: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateDefinition {
    pub template_id: &'static str,
    pub name: &'static str,
    pub card_type: CardType,
    pub slots: Vec<SlotSpec>,
}

/// A template paired with its eligibility verdict for one trigger context.
#[derive(Debug, Clone)]
pub struct TemplateSelection {
    pub definition: TemplateDefinition,
    pub priority: i64,
    pub reason: String,
}

/// The selection projected into the slot specifications the emission step
/// consumes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplatePlan {
    pub template_id: &'static str,
    pub card_type: CardType,
    pub slots: Vec<SlotSpec>,
}
