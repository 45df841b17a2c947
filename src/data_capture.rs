pub mod history_log;
pub mod recorder;
pub mod relay_session;
pub mod types;

pub use history_log::HistoryLog;
pub use recorder::{CaptureOrigin, PacketRecorder};
pub use relay_session::{RelaySession, SessionSummary};
pub use types::{Direction, PacketDraft, PacketRecord};
