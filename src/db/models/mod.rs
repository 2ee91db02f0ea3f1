pub mod heart_record;
pub mod prediction_record;
pub mod record_kind;
pub mod sensor_record;
pub mod step_record;

pub use heart_record::{HeartRecord, HeartSample};
pub use prediction_record::PredictionRecord;
pub use record_kind::RecordKind;
pub use sensor_record::{Axis3, SensorRecord};
pub use step_record::StepRecord;
