//! Aggregation of decoded models by base name.
//!
//! Top-level chunks may be decoded on independent workers, so a [`Builders`]
//! map and every [`Builder`] in it can be shared freely: deposits under the
//! same base name serialize on that entry's lock, deposits under distinct
//! names do not contend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use super::{Bbox, Model};

/// Aggregation context for a single base name: its bounding box and every
/// LOD's models, in deposit order.
#[derive(Default)]
pub struct Builder {
    state: Mutex<BuilderState>,
}

#[derive(Default)]
struct BuilderState {
    bbox: Bbox,
    models: Vec<Model>,
}

impl Builder {
    pub fn set_bbox(&self, bbox: Bbox) {
        self.lock().bbox = bbox;
    }

    pub fn add_model(&self, model: Model) {
        self.lock().models.push(model);
    }

    pub fn bbox(&self) -> Bbox {
        self.lock().bbox
    }

    pub fn models(&self) -> Vec<Model> {
        self.lock().models.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builders keyed by model base name, in first-deposit order.
#[derive(Default)]
pub struct Builders {
    map: Mutex<IndexMap<String, Arc<Builder>>>,
}

impl Builders {
    pub fn new() -> Self {
        Self::default()
    }

    /// The builder for `name`, created on first use.
    pub fn entry(&self, name: &str) -> Arc<Builder> {
        let mut map = self.lock();
        if let Some(builder) = map.get(name) {
            return Arc::clone(builder);
        }
        let builder = Arc::new(Builder::default());
        map.insert(name.to_owned(), Arc::clone(&builder));
        builder
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, Arc<Builder>> {
        self.map.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Arc<Builder>>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
