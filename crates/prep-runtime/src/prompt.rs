use dialoguer::{theme::ColorfulTheme, Select};
use prep_core::grouping::{Disambiguator, Grouping};
use tracing::warn;

/// Asks on the terminal which grouping an ambiguous name refers to.
///
/// Escape, or a terminal that cannot be prompted, yields no choice.
pub struct PromptDisambiguator;

impl Disambiguator for PromptDisambiguator {
    fn choose(&self, query: &str, candidates: &[&'static Grouping]) -> Option<usize> {
        let items: Vec<&str> = candidates.iter().map(|g| g.name).collect();
        match Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Several groupings match {query:?}, pick one"))
            .items(&items)
            .default(0)
            .interact_opt()
        {
            Ok(choice) => choice,
            Err(e) => {
                warn!("Cannot prompt for grouping {:?}: {}", query, e);
                None
            }
        }
    }
}
