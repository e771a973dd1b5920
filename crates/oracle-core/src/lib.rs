//! oracle-core - private question/answer oracle client
//!
//! Client core for a fee-gated oracle on a zk rollup. Questions are private
//! notes addressed to a divinity, who answers them for the fee; the requester
//! may cancel and get refunded until then.
//!
//! This crate owns the read/derive pipeline:
//! - codec: question/answer text packed into one field element
//! - projection: storage preimages, contract query results and legacy named
//!   notes normalized into one record type
//! - view: question and answer streams merged into rows with per-viewer actions
//!
//! Note encryption, authorization witnesses and transaction finality belong
//! to the rollup client; they are reached through the traits in [`client`].
//! [`sandbox`] implements them in memory.
//!
//! ## usage
//!
//! ```rust,ignore
//! let state = DeploymentState::from_config(DeploymentConfig::from_env()?);
//! let session = OracleSession::new(viewer, &state, collaborators, &OracleSettings::default())?;
//! session.refresh().await?;
//! for row in session.rows().iter() {
//!     println!("{} -> {} ({:?})", row.question_text, row.answer_text, row.action());
//! }
//! ```

pub mod address;
pub mod app;
pub mod client;
pub mod codec;
pub mod config;
pub mod deploy;
pub mod error;
pub mod poller;
pub mod projection;
pub mod records;
pub mod sandbox;
pub mod session;
pub mod token;
pub mod view;

// Re-export Crux app
pub use app::{Effect, Event, Model, OracleApp, Popup, PopupKind, RowView, Screen, ViewModel};

pub use address::{short_address, Address, TxHash};
pub use client::{Collaborators, Deployer, OracleActions, RecordSource, TokenActions};
pub use codec::{decode_text, display_text, encode_text, Field, FIELD_TEXT_CAPACITY};
pub use config::{DeploymentConfig, DeploymentState, OracleSettings};
pub use deploy::deploy;
pub use error::{OracleError, Result};
pub use poller::PollHandle;
pub use projection::{FunctionHandle, Projector, SlotLayout, SourceDescriptor, SourceStrategy};
pub use records::{AnswerRecord, QuestionRecord, RawRecord, RecordKind};
pub use sandbox::{Sandbox, SandboxWallet};
pub use session::{OracleSession, Pollers, Refresh};
pub use token::Balances;
pub use view::{assemble, merge, CollapsePolicy, MergedRow, RowAction, RowStatus, ViewRow};
