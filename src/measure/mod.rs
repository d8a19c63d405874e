pub mod calibration;
pub mod gate;
pub mod geometry;
pub mod lock;
pub mod session;
pub mod smoother;
pub mod stability;
pub mod window;

pub use calibration::{CalibrationError, CalibrationState, ScaleCalibrator};
pub use gate::{GateRejection, GatedPose, GuideRegion, LandmarkGate};
pub use geometry::{GeometryError, GeometryEstimator, MeasurementSample};
pub use lock::{LockCriteria, LockQuality, LockedMeasurement};
pub use session::{Session, SessionEffect, SessionError, SessionPhase, Status};
pub use smoother::{MedianSmoother, Metric, SmoothedEstimate};
pub use stability::{StabilityDetector, StabilityReading};
pub use window::SlidingWindow;
