//! # Rule-Set Transformations
//!
//! Passes that rewrite a sealed rule set into a semantically equivalent,
//! more specialized one, driven by the facts of a dataflow analysis:
//!
//! - [`CoiArgFilter`]: erases argument positions outside the cone of
//!   influence of the output predicates;
//! - [`RuleExploder`]: case-splits rules over predicates whose tracked
//!   columns range over finitely many values.
//!
//! ```text
//! RuleSet -> [analysis engine] -> facts -> [transformer] -> RuleSet
//!                                              │
//!                                   model converter (COI filter only)
//! ```
//!
//! A [`Pipeline`] chains transformers and collects the model converters
//! they register, so a model of the final program can be lifted back to
//! the source vocabulary.

use crate::model::{Model, ModelConverter};
use crate::rules::{RuleSet, SymbolStore};
use crate::term::TermStore;
use tracing::debug;

pub mod coi_filter;
pub mod exploder;

pub use coi_filter::CoiArgFilter;
pub use exploder::RuleExploder;

/// A rule-set-to-rule-set transformation.
pub trait RuleTransformer {
    fn name(&self) -> &'static str;

    /// Produce the transformed rule set. The source must be closed.
    fn transform(
        &mut self,
        store: &mut TermStore,
        syms: &mut SymbolStore,
        source: &RuleSet,
    ) -> RuleSet;

    /// The model converter registered by the last [`transform`] call.
    ///
    /// [`transform`]: RuleTransformer::transform
    fn take_model_converter(&mut self) -> Option<Box<dyn ModelConverter>> {
        None
    }
}

/// Runs transformers in sequence and accumulates their model converters.
#[derive(Default)]
pub struct Pipeline {
    converters: Vec<Box<dyn ModelConverter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn apply<T: RuleTransformer>(
        &mut self,
        transformer: &mut T,
        store: &mut TermStore,
        syms: &mut SymbolStore,
        source: &RuleSet,
    ) -> RuleSet {
        assert!(source.is_closed(), "transformations require a sealed rule set");
        debug!(pass = transformer.name(), rules = source.len(), "running transformation");
        let result = transformer.transform(store, syms, source);
        if let Some(converter) = transformer.take_model_converter() {
            self.converters.push(converter);
        }
        debug!(pass = transformer.name(), rules = result.len(), "transformation done");
        result
    }

    /// Lift a model of the final program back across every applied pass,
    /// most recent first.
    pub fn convert_model(&self, store: &mut TermStore, model: &mut Model) {
        for converter in self.converters.iter().rev() {
            converter.convert(store, model);
        }
    }

    pub fn converter_count(&self) -> usize {
        self.converters.len()
    }
}
