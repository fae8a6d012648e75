//! The datapoint-type (DPT) collaborator: translates typed application
//! values to and from their raw ASDU encoding. The process communicator's
//! `read(dp)`/`readNumeric(dp)` entry points delegate here; they never
//! interpret ASDU bytes themselves.

use crate::error::Result;

pub trait Translator: Send + Sync {
    fn set_value(&mut self, value: &str) -> Result<()>;
    fn set_data(&mut self, data: &[u8]) -> Result<()>;

    fn value(&self) -> String;
    fn numeric_value(&self) -> Result<f64>;
    fn data(&self) -> Vec<u8>;

    /// Size in bytes of one item's encoding (0 for sub-byte datapoints).
    fn type_size(&self) -> usize;
    fn items(&self) -> usize;
}

pub trait DptRegistry: Send + Sync {
    fn create_translator(&self, dpt_id: &str) -> Result<Box<dyn Translator>>;
}
