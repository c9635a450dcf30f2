use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use super::{EmotionDrivenStrategy, SelectionStrategy, SmartSelectionStrategy, ThemeBasedStrategy};

/// Name of the strategy used when none (or an unknown one) is requested.
pub const DEFAULT_STRATEGY: &str = "smart_selection";

/// Registry of selection strategies keyed by name.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<&'static str, Arc<dyn SelectionStrategy>>,
}

impl StrategyRegistry {
    /// Empty registry. [`resolve`](Self::resolve) needs the default strategy,
    /// so most callers want [`with_defaults`](Self::with_defaults).
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Registry with the built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SmartSelectionStrategy));
        registry.register(Arc::new(ThemeBasedStrategy));
        registry.register(Arc::new(EmotionDrivenStrategy));
        registry
    }

    /// Register a strategy, replacing any previous one with the same name.
    pub fn register(&mut self, strategy: Arc<dyn SelectionStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SelectionStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.keys().copied()
    }

    /// Look up a strategy, falling back to the default for unknown or empty names.
    pub fn resolve(&self, name: Option<&str>) -> Arc<dyn SelectionStrategy> {
        let requested = name.map(str::trim).filter(|n| !n.is_empty());
        if let Some(strategy) = requested.and_then(|n| self.get(n)) {
            return strategy;
        }

        if let Some(unknown) = requested {
            warn!(strategy = unknown, fallback = DEFAULT_STRATEGY, "Unknown selection strategy");
        }

        self.get(DEFAULT_STRATEGY)
            .unwrap_or_else(|| Arc::new(SmartSelectionStrategy))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_strategies_registered() {
        let registry = StrategyRegistry::with_defaults();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["emotion_driven", "smart_selection", "theme_based"]);
    }

    #[test]
    fn test_unknown_name_falls_back_to_default() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.resolve(Some("neural_magic")).name(), DEFAULT_STRATEGY);
        assert_eq!(registry.resolve(None).name(), DEFAULT_STRATEGY);
        assert_eq!(registry.resolve(Some("theme_based")).name(), "theme_based");
    }

    #[test]
    fn test_empty_registry_still_resolves() {
        assert_eq!(StrategyRegistry::new().resolve(None).name(), DEFAULT_STRATEGY);
    }
}
