//! Intent classification: which specialized bee, if any, should handle a prompt.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Specializations served by the asynchronous worker swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BeeKind {
    /// Revenue, payments and invoices.
    Finance,
    /// Moderation, bans and account security.
    Security,
    /// Joual translation and expressions.
    Joual,
    /// Food, recipes and restaurants.
    Poutine,
    /// Hockey scores and games.
    Hockey,
}

impl BeeKind {
    /// Lower-case tag used on the queue.
    pub fn as_str(self) -> &'static str {
        match self {
            BeeKind::Finance => "finance",
            BeeKind::Security => "security",
            BeeKind::Joual => "joual",
            BeeKind::Poutine => "poutine",
            BeeKind::Hockey => "hockey",
        }
    }

    /// Display name of the bee, e.g. `FinanceBee`.
    pub fn bee_name(self) -> String {
        let tag = self.as_str();
        let mut chars = tag.chars();
        match chars.next() {
            Some(first) => format!("{}{}Bee", first.to_uppercase(), chars.as_str()),
            None => "Bee".to_string(),
        }
    }
}

impl fmt::Display for BeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(pattern, category)` entry of the routing table.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pattern: Regex,
    kind: BeeKind,
}

impl IntentRule {
    /// Creates a rule from a compiled pattern.
    pub fn new(pattern: Regex, kind: BeeKind) -> Self {
        Self { pattern, kind }
    }

    /// Compiles `pattern` into a rule.
    pub fn parse(pattern: &str, kind: BeeKind) -> Result<Self, regex::Error> {
        Ok(Self::new(Regex::new(pattern)?, kind))
    }

    fn matches(&self, prompt: &str) -> bool {
        self.pattern.is_match(prompt)
    }
}

static DEFAULT_RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    [
        (
            r"revenue|revenu|stripe|facture|paiement|money|argent",
            BeeKind::Finance,
        ),
        (
            r"security|s[ée]curit[ée]|hack|\bban\b|admin|report|signaler",
            BeeKind::Security,
        ),
        (
            r"joual|traduction|tradui|expression|accent",
            BeeKind::Joual,
        ),
        (r"poutine|recette|restaurant|manger", BeeKind::Poutine),
        (r"hockey|canadiens|score|\bgame\b", BeeKind::Hockey),
    ]
    .into_iter()
    .filter_map(|(pattern, kind)| IntentRule::parse(pattern, kind).ok())
    .collect()
});

/// Ordered routing table. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl IntentClassifier {
    /// A classifier with a deployment-specific table.
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// A classifier that never routes to the swarm.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Returns the specialization for `prompt`, or `None` for general handling.
    pub fn classify(&self, prompt: &str) -> Option<BeeKind> {
        let prompt = prompt.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&prompt))
            .map(|rule| rule.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_first_match() {
        let classifier = IntentClassifier::default();
        assert_eq!(
            classifier.classify("Comment va mon compte de sécurité?"),
            Some(BeeKind::Security)
        );
        assert_eq!(classifier.classify("Mon revenu Stripe"), Some(BeeKind::Finance));
        assert_eq!(
            classifier.classify("Traduction de 'char' en joual"),
            Some(BeeKind::Joual)
        );
        assert_eq!(
            classifier.classify("Une RECETTE de poutine"),
            Some(BeeKind::Poutine)
        );
        assert_eq!(
            classifier.classify("Le score des Canadiens"),
            Some(BeeKind::Hockey)
        );
        // Finance is checked before poutine.
        assert_eq!(
            classifier.classify("combien d'argent pour une poutine"),
            Some(BeeKind::Finance)
        );
    }

    #[test]
    fn general_prompts_stay_local() {
        let classifier = IntentClassifier::default();
        assert_eq!(classifier.classify("bonjour"), None);
        assert_eq!(classifier.classify(""), None);
        assert_eq!(classifier.classify("la banque ouvre à quelle heure"), None);
    }

    #[test]
    fn custom_tables_replace_the_defaults() {
        let classifier =
            IntentClassifier::new(vec![IntentRule::parse("facture", BeeKind::Security).unwrap()]);
        assert_eq!(classifier.classify("ma facture"), Some(BeeKind::Security));
        assert_eq!(classifier.classify("hockey"), None);
        assert_eq!(IntentClassifier::empty().classify("hockey"), None);
    }

    #[test]
    fn bee_names_are_capitalised() {
        assert_eq!(BeeKind::Finance.bee_name(), "FinanceBee");
        assert_eq!(BeeKind::Poutine.bee_name(), "PoutineBee");
    }
}
