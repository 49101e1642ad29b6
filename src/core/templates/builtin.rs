use crate::core::store::types::CardType;

use super::CardTemplate;
use super::types::{
    ContentStrategy, Eligibility, MatchSource, SlotSpec, TemplateDefinition, TriggerContext,
};

const DEFINITION_LABEL_WORD_LIMIT: usize = 5;
const SUMMARY_MIN_BULLETS: usize = 2;

pub struct DefinitionTemplate;

impl CardTemplate for DefinitionTemplate {
    fn definition(&self) -> TemplateDefinition {
        TemplateDefinition {
            template_id: "definition",
            name: "Definition",
            card_type: CardType::Text,
            slots: vec![SlotSpec {
                id: "body",
                required: true,
                strategy: ContentStrategy::Definition,
                max_len: 280,
                markdown: false,
            }],
        }
    }

    fn evaluate(&self, cx: &TriggerContext) -> Eligibility {
        if cx.match_source == MatchSource::Glossary || !cx.glossary_matches.is_empty() {
            return Eligibility::yes(100, "glossary-backed concept");
        }
        if cx.label_word_count() <= DEFINITION_LABEL_WORD_LIMIT && !cx.supporting_facts.is_empty()
        {
            return Eligibility::yes(60, "short concept with supporting facts");
        }
        Eligibility::no("no glossary match and no short fact-backed label")
    }
}

pub struct SummaryTemplate;

impl CardTemplate for SummaryTemplate {
    fn definition(&self) -> TemplateDefinition {
        TemplateDefinition {
            template_id: "summary",
            name: "Summary",
            card_type: CardType::TextVisual,
            slots: vec![
                SlotSpec {
                    id: "body",
                    required: true,
                    strategy: ContentStrategy::Synthesis,
                    max_len: 480,
                    markdown: true,
                },
                SlotSpec {
                    id: "label",
                    required: true,
                    strategy: ContentStrategy::Caption,
                    max_len: 60,
                    markdown: false,
                },
                SlotSpec {
                    id: "visual_request",
                    required: false,
                    strategy: ContentStrategy::VisualPrompt,
                    max_len: 200,
                    markdown: false,
                },
            ],
        }
    }

    fn evaluate(&self, cx: &TriggerContext) -> Eligibility {
        if cx.context_bullets.len() < SUMMARY_MIN_BULLETS {
            return Eligibility::no("fewer than two context bullets");
        }
        if cx.prior_card_ids.is_empty() {
            Eligibility::yes(30, "enough bullets, first card for concept")
        } else {
            Eligibility::yes(40, "enough bullets with prior related cards")
        }
    }
}
