use crate::core::store::types::CardType;
use crate::core::templates::types::{
    Eligibility, GlossaryEntry, MatchSource, TemplateDefinition, TriggerContext,
};
use crate::core::templates::{CardTemplate, TemplateRegistry};

fn base_context() -> TriggerContext {
    TriggerContext {
        concept_id: "concept-1".to_string(),
        concept_label: "Vector clock".to_string(),
        match_source: MatchSource::Transcript,
        supporting_facts: Vec::new(),
        prior_card_ids: Vec::new(),
        glossary_matches: Vec::new(),
        context_bullets: Vec::new(),
        transcript_chunks: Vec::new(),
    }
}

fn glossary_entry(term: &str) -> GlossaryEntry {
    GlossaryEntry {
        term: term.to_string(),
        definition: format!("definition of {}", term),
    }
}

#[test]
fn glossary_backed_concept_selects_definition_at_top_priority() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    cx.glossary_matches = vec![
        glossary_entry("vector clock"),
        glossary_entry("logical clock"),
        glossary_entry("lamport clock"),
    ];
    // Make the summary predicate hold too, so this exercises the ordering.
    cx.context_bullets = vec!["a".to_string(), "b".to_string()];

    let selection = registry.select(&cx).expect("expected a selection");
    assert_eq!(selection.definition.template_id, "definition");
    assert_eq!(selection.priority, 100);
}

#[test]
fn selection_is_deterministic_for_identical_contexts() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    cx.glossary_matches = vec![glossary_entry("vector clock")];
    cx.context_bullets = vec!["a".to_string(), "b".to_string()];

    let first = registry.select(&cx).expect("selection");
    for _ in 0..10 {
        let again = registry.select(&cx).expect("selection");
        assert_eq!(again.definition.template_id, first.definition.template_id);
        assert_eq!(again.priority, first.priority);
    }
}

#[test]
fn short_label_with_facts_selects_definition_at_reduced_priority() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    cx.supporting_facts = vec!["ordering of distributed events".to_string()];

    let selection = registry.select(&cx).expect("selection");
    assert_eq!(selection.definition.template_id, "definition");
    assert_eq!(selection.priority, 60);
}

#[test]
fn bullets_without_prior_cards_select_summary_at_30() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    cx.context_bullets = vec!["first point".to_string(), "second point".to_string()];

    let selection = registry.select(&cx).expect("selection");
    assert_eq!(selection.definition.template_id, "summary");
    assert_eq!(selection.priority, 30);
}

#[test]
fn bullets_with_prior_cards_select_summary_at_40() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    cx.context_bullets = vec!["first point".to_string(), "second point".to_string()];
    cx.prior_card_ids = vec!["card-1".to_string()];

    let selection = registry.select(&cx).expect("selection");
    assert_eq!(selection.definition.template_id, "summary");
    assert_eq!(selection.priority, 40);
}

#[test]
fn unsupported_context_declines_instead_of_fabricating() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    // 0 glossary matches, 1 bullet, 7-word label: neither predicate holds.
    cx.concept_label = "a rather long seven word concept label".to_string();
    cx.context_bullets = vec!["only one bullet".to_string()];

    assert!(registry.select(&cx).is_none());
}

#[test]
fn malformed_context_short_circuits_to_none() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    cx.concept_id = "   ".to_string();
    cx.glossary_matches = vec![glossary_entry("anything")];

    assert!(registry.select(&cx).is_none());
}

struct FixedTemplate {
    id: &'static str,
    priority: i64,
}

impl CardTemplate for FixedTemplate {
    fn definition(&self) -> TemplateDefinition {
        TemplateDefinition {
            template_id: self.id,
            name: self.id,
            card_type: CardType::Text,
            slots: vec![],
        }
    }

    fn evaluate(&self, _cx: &TriggerContext) -> Eligibility {
        Eligibility::yes(self.priority, "fixed")
    }
}

#[test]
fn priority_ties_break_by_registration_order() {
    let mut registry = TemplateRegistry::new();
    registry.register(Box::new(FixedTemplate {
        id: "first",
        priority: 50,
    }));
    registry.register(Box::new(FixedTemplate {
        id: "second",
        priority: 50,
    }));

    let selection = registry.select(&base_context()).expect("selection");
    assert_eq!(selection.definition.template_id, "first");
}

#[test]
fn plan_projects_winning_definition_into_slots() {
    let registry = TemplateRegistry::with_builtin();
    let mut cx = base_context();
    cx.glossary_matches = vec![glossary_entry("vector clock")];

    let selection = registry.select(&cx).expect("selection");
    let plan = TemplateRegistry::plan(&selection);
    assert_eq!(plan.template_id, "definition");
    assert_eq!(plan.card_type, CardType::Text);
    assert_eq!(plan.slots.len(), 1);
    assert!(plan.slots[0].required);
}
