//! Reservation flow orchestration.
//!
//! The synchronization and validation core of the encore driver: bounded
//! polling with one-shot recovery, unbounded-but-cancellable popup
//! detection, the OCR challenge loop, zone expansion/selection, the seat
//! contention walk, payment advancement, and the orchestrator sequencing
//! them. Components are generic over the [`ui::PageOps`] /
//! [`ui::SessionBrowser`] seam so every stage runs against the real CDP
//! driver or the scripted doubles in [`mock`].

pub mod artifacts;
pub mod challenge;
pub mod error;
pub mod mock;
pub mod payment;
pub mod poll;
pub mod popup;
mod script;
pub mod seats;
pub mod session;
pub mod ui;
pub mod zones;

pub use artifacts::ArtifactSink;
pub use challenge::{ChallengeAttempt, ChallengeConfig, ChallengeSolver};
pub use error::FlowError;
pub use payment::{PaymentAdvancer, PaymentConfig};
pub use poll::{poll_until, poll_until_with_recovery, PollOutcome};
pub use popup::PopupLocator;
pub use seats::{
    choose_fallback, SeatAttributes, SeatConfig, SeatSelector, SelectionProbe, StrokeFillProbe,
};
pub use session::{ReservationSession, SessionReport};
pub use ui::{PageOps, SessionBrowser};
pub use zones::{ZoneConfig, ZoneExpander, ZoneSelector};
