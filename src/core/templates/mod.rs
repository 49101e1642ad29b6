mod builtin;
pub mod types;

pub use builtin::{DefinitionTemplate, SummaryTemplate};

use tracing::debug;

use types::{Eligibility, TemplateDefinition, TemplatePlan, TemplateSelection, TriggerContext};

/// A registered card template: a structural definition plus an eligibility
/// predicate over trigger contexts.
pub trait CardTemplate: Send + Sync {
    fn definition(&self) -> TemplateDefinition;
    fn evaluate(&self, cx: &TriggerContext) -> Eligibility;
}

/// Registration order matters: ties on priority are broken by it, which keeps
/// selection deterministic for identical contexts.
pub struct TemplateRegistry {
    templates: Vec<Box<dyn CardTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: Vec::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DefinitionTemplate));
        registry.register(Box::new(SummaryTemplate));
        registry
    }

    pub fn register(&mut self, template: Box<dyn CardTemplate>) {
        self.templates.push(template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Pick the best-eligible template for a trigger context, or decline.
    /// A malformed context short-circuits to `None` rather than erroring;
    /// the caller suppresses emission instead of fabricating a generic card.
    pub fn select(&self, cx: &TriggerContext) -> Option<TemplateSelection> {
        if !cx.is_well_formed() {
            debug!(
                "Declining template selection: malformed trigger context for '{}'",
                cx.concept_id
            );
            return None;
        }

        let mut candidates: Vec<TemplateSelection> = Vec::new();
        for template in &self.templates {
            let verdict = template.evaluate(cx);
            if verdict.eligible {
                candidates.push(TemplateSelection {
                    definition: template.definition(),
                    priority: verdict.priority.unwrap_or(0),
                    reason: verdict.reason,
                });
            } else {
                debug!(
                    "Template '{}' ineligible for '{}': {}",
                    template.definition().template_id,
                    cx.concept_id,
                    verdict.reason
                );
            }
        }

        // Stable sort: equal priorities keep registration order.
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        candidates.into_iter().next()
    }

    pub fn plan(selection: &TemplateSelection) -> TemplatePlan {
        TemplatePlan {
            template_id: selection.definition.template_id,
            card_type: selection.definition.card_type,
            slots: selection.definition.slots.clone(),
        }
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests;
