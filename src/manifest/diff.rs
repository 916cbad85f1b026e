use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::extractor::Endpoint;

/// Change between two endpoint sets of the same scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointDiff {
    pub added: Vec<Endpoint>,
    pub removed: Vec<Endpoint>,
    /// New versions of endpoints whose id survived but content changed
    pub modified: Vec<Endpoint>,
}

impl EndpointDiff {
    pub fn compute<'a>(
        previous: impl IntoIterator<Item = &'a Endpoint>,
        next: impl IntoIterator<Item = &'a Endpoint>,
    ) -> Self {
        let previous: HashMap<&str, &Endpoint> =
            previous.into_iter().map(|e| (e.id.as_str(), e)).collect();
        let mut seen = Vec::new();
        let mut diff = EndpointDiff::default();

        for endpoint in next {
            match previous.get(endpoint.id.as_str()) {
                None => diff.added.push(endpoint.clone()),
                Some(old) if !old.same_content(endpoint) => diff.modified.push(endpoint.clone()),
                Some(_) => {}
            }
            seen.push(endpoint.id.as_str());
        }

        let mut removed: Vec<Endpoint> = previous
            .into_iter()
            .filter(|(id, _)| !seen.contains(id))
            .map(|(_, e)| e.clone())
            .collect();
        removed.sort_by(|a, b| a.id.cmp(&b.id));
        diff.removed = removed;
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}
