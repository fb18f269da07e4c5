//! The canonical data model: detections, hits, objects, light curves.

mod alert;
mod citation;
mod detection;
mod hit;
mod idx;
mod lightcurve;
mod notice;
mod object;

pub use alert::Alert;
pub use citation::CitationSource;
pub use detection::{DetectionEvent, MatchCandidate, Source};
pub use hit::{CoordEntry, CrossMatchHit, IdentifierEntry, TimestampEntry};
pub use idx::IdxCounter;
pub use lightcurve::{LightCurve, LightCurveRow};
pub use notice::{ChangeEntry, ChangeNotice, ChangeSummary, NoticeStatus, NoticeTopic};
pub use object::{push_unique, DatedValue, FieldValue, ObjectMetadata};
