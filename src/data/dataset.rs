use burn::data::dataset::Dataset;

use crate::domain::instance::PretrainingInstance;

/// In-memory pretraining examples, all padded to the same shapes.
pub struct PretrainingDataset {
    instances: Vec<PretrainingInstance>,
}

impl PretrainingDataset {
    pub fn new(instances: Vec<PretrainingInstance>) -> Self { Self { instances } }

    pub fn instance_count(&self) -> usize { self.instances.len() }

    /// Real masked predictions across the whole dataset
    pub fn prediction_count(&self) -> usize {
        self.instances.iter().map(PretrainingInstance::num_predictions).sum()
    }
}

impl Dataset<PretrainingInstance> for PretrainingDataset {
    fn get(&self, index: usize) -> Option<PretrainingInstance> {
        self.instances.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.instances.len()
    }
}
