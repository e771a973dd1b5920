//! crux app: shared presentation core for oracle shells
//!
//! the shell drives an [`crate::session::OracleSession`] and forwards its
//! results here as events; the view model is what gets rendered.

use crux_core::{render::{render, RenderOperation}, App, Command, Request};
use serde::{Deserialize, Serialize};

use crate::address::{Address, TxHash};
use crate::codec::{field_hex, Field};
use crate::config::{DeploymentConfig, DeploymentState};
use crate::token::Balances;
use crate::view::ViewRow;

pub const DEFAULT_QUESTION: &str = "What's the ratio for fernet?";
pub const DEFAULT_ANSWER: &str = "70/30 of course";

/// Events from shell to core
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Event {
    // Lifecycle
    Init { viewer: Address, deployment: Option<DeploymentConfig> },
    Deployed { config: DeploymentConfig },

    // Records
    RowsLoaded { rows: Vec<ViewRow> },
    FetchFailed { message: String },

    // Navigation
    NewQuestion,
    SelectQuestion { request_id: Field },
    Back,

    // Drafts
    EditQuestion { text: String },
    EditDivinity { address: String },
    EditAnswer { text: String },

    // Actions
    ActionStarted { request_id: Field },
    ActionSucceeded { request_id: Field, tx_hash: TxHash },
    ActionFailed { request_id: Option<Field>, message: String },

    // Tokens
    BalancesUpdated { balances: Balances },

    /// outcome of an operation outside the question rows (mint, approvals)
    Notice { message: String },
    DismissMessage,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Questions,
    NewQuestion,
    AnswerQuestion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PopupKind {
    Info,
    Error,
}

/// dismissable result message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Popup {
    pub kind: PopupKind,
    pub message: String,
}

/// App state (owned by core)
#[derive(Debug, Default)]
pub struct Model {
    pub viewer: Option<Address>,
    pub deployment: DeploymentState,
    pub screen: Screen,

    pub rows: Vec<ViewRow>,
    pub fetch_error: Option<String>,
    pub selected: Option<Field>,
    /// request ids with an action in flight
    pub pending: Vec<Field>,

    pub question_draft: String,
    pub divinity_draft: String,
    pub answer_draft: String,

    pub balances: Balances,
    pub popup: Option<Popup>,
}

/// one rendered table row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowView {
    pub request_id: String,
    pub question: String,
    pub answer: String,
    pub requester: String,
    pub divinity: String,
    /// button label, `None` for resolved rows
    pub action: Option<String>,
    pub pending: bool,
}

/// ViewModel sent to shell for rendering
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct ViewModel {
    pub screen: Screen,
    pub is_deployed: bool,
    pub viewer: Option<String>,
    pub oracle: Option<String>,
    pub token: Option<String>,
    pub fee: Option<u64>,

    pub rows: Vec<RowView>,
    pub fetch_error: Option<String>,
    pub selected: Option<RowView>,

    pub question_draft: String,
    pub divinity_draft: String,
    pub answer_draft: String,

    pub private_balance: String,
    pub public_balance: String,

    pub popup: Option<Popup>,
}

/// Effect enum for capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    Render(RenderOperation),
}

impl crux_core::Effect for Effect {}

impl From<Request<RenderOperation>> for Effect {
    fn from(req: Request<RenderOperation>) -> Self {
        Effect::Render(req.operation)
    }
}

#[derive(Default)]
pub struct OracleApp;

impl OracleApp {
    fn row_view(model: &Model, row: &ViewRow) -> RowView {
        RowView {
            request_id: field_hex(row.request_id),
            question: row.question_text.clone(),
            answer: row.answer_text.clone(),
            requester: row.requester_short(),
            divinity: row.divinity_short(),
            action: row.status.action_label().map(str::to_string),
            pending: model.pending.contains(&row.request_id),
        }
    }

    fn info(model: &mut Model, message: String) {
        model.popup = Some(Popup {
            kind: PopupKind::Info,
            message,
        });
    }

    fn error(model: &mut Model, message: String) {
        model.popup = Some(Popup {
            kind: PopupKind::Error,
            message,
        });
    }
}

impl App for OracleApp {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = ();
    type Effect = Effect;

    fn update(
        &self,
        event: Self::Event,
        model: &mut Self::Model,
        _caps: &Self::Capabilities,
    ) -> Command<Self::Effect, Self::Event> {
        match event {
            Event::Init { viewer, deployment } => {
                model.viewer = Some(viewer);
                model.deployment = DeploymentState::from_config(deployment);
                model.screen = Screen::Questions;
            }

            Event::Deployed { config } => {
                if let Err(e) = model.deployment.mark_deployed(config) {
                    Self::error(model, e.to_string());
                } else {
                    Self::info(model, format!("oracle deployed at {}", config.oracle.short()));
                }
            }

            Event::RowsLoaded { rows } => {
                model.rows = rows;
                model.fetch_error = None;
            }

            Event::FetchFailed { message } => {
                // keep the last rows
                model.fetch_error = Some(message);
            }

            Event::NewQuestion => {
                if model.deployment.is_deployed() {
                    model.screen = Screen::NewQuestion;
                    model.question_draft = DEFAULT_QUESTION.to_string();
                    model.divinity_draft.clear();
                } else {
                    Self::error(model, "oracle is not deployed".to_string());
                }
            }

            Event::SelectQuestion { request_id } => {
                let answerable = model
                    .rows
                    .iter()
                    .any(|r| r.request_id == request_id && r.can_answer());
                if answerable {
                    model.selected = Some(request_id);
                    model.answer_draft = DEFAULT_ANSWER.to_string();
                    model.screen = Screen::AnswerQuestion;
                } else {
                    Self::error(model, format!("{} cannot be answered", field_hex(request_id)));
                }
            }

            Event::Back => {
                model.screen = Screen::Questions;
                model.selected = None;
            }

            Event::EditQuestion { text } => model.question_draft = text,
            Event::EditDivinity { address } => model.divinity_draft = address,
            Event::EditAnswer { text } => model.answer_draft = text,

            Event::ActionStarted { request_id } => {
                if !model.pending.contains(&request_id) {
                    model.pending.push(request_id);
                }
            }

            Event::ActionSucceeded { request_id, tx_hash } => {
                model.pending.retain(|id| *id != request_id);
                Self::info(model, format!("transaction {} finalized", tx_hash.short()));
                model.screen = Screen::Questions;
                model.selected = None;
            }

            Event::ActionFailed { request_id, message } => {
                if let Some(request_id) = request_id {
                    model.pending.retain(|id| *id != request_id);
                }
                Self::error(model, message);
            }

            Event::BalancesUpdated { balances } => {
                model.balances = balances;
            }

            Event::Notice { message } => {
                Self::info(model, message);
            }

            Event::DismissMessage => {
                model.popup = None;
            }
        }

        render()
    }

    fn view(&self, model: &Self::Model) -> Self::ViewModel {
        let deployment = model.deployment.deployment();
        let selected = model.selected.and_then(|id| {
            model
                .rows
                .iter()
                .find(|r| r.request_id == id)
                .map(|r| Self::row_view(model, r))
        });

        ViewModel {
            screen: model.screen,
            is_deployed: deployment.is_some(),
            viewer: model.viewer.map(|v| v.short()),
            oracle: deployment.map(|d| d.oracle.to_string()),
            token: deployment.map(|d| d.token.to_string()),
            fee: deployment.map(|d| d.fee),
            rows: model.rows.iter().map(|r| Self::row_view(model, r)).collect(),
            fetch_error: model.fetch_error.clone(),
            selected,
            question_draft: model.question_draft.clone(),
            divinity_draft: model.divinity_draft.clone(),
            answer_draft: model.answer_draft.clone(),
            private_balance: model.balances.private_display(),
            public_balance: model.balances.public_display(),
            popup: model.popup.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_text;
    use crate::view::{assemble, CollapsePolicy};
    use crate::records::QuestionRecord;
    use crux_core::testing::AppTester;

    fn addr(n: u64) -> Address {
        Address::from_field(Field::from(n))
    }

    fn config() -> DeploymentConfig {
        DeploymentConfig {
            oracle: addr(0x100),
            token: addr(0x200),
            fee: 1000,
            tx_hash: TxHash::default(),
        }
    }

    fn rows_for(viewer: Address) -> Vec<ViewRow> {
        let questions = [
            QuestionRecord {
                request_id: encode_text("mine?").unwrap(),
                requester: addr(1),
                divinity: addr(2),
            },
            QuestionRecord {
                request_id: encode_text("theirs?").unwrap(),
                requester: addr(3),
                divinity: addr(1),
            },
        ];
        assemble(&questions, &[], &viewer, CollapsePolicy::KeepBoth)
    }

    fn started(viewer: Address, deployment: Option<DeploymentConfig>) -> (AppTester<OracleApp>, Model) {
        let app = AppTester::<OracleApp>::default();
        let mut model = Model::default();
        let _ = app.update(Event::Init { viewer, deployment }, &mut model);
        (app, model)
    }

    #[test]
    fn test_rows_rendered_with_actions() {
        let (app, mut model) = started(addr(1), Some(config()));
        let _ = app.update(Event::RowsLoaded { rows: rows_for(addr(1)) }, &mut model);

        let view = app.view(&model);
        assert!(view.is_deployed);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].question, "mine?");
        assert_eq!(view.rows[0].answer, "-");
        assert_eq!(view.rows[0].action.as_deref(), Some("Cancel"));
        assert_eq!(view.rows[1].action.as_deref(), Some("Answer"));
        assert_eq!(view.private_balance, "-");
    }

    #[test]
    fn test_fetch_failure_keeps_rows() {
        let (app, mut model) = started(addr(1), Some(config()));
        let _ = app.update(Event::RowsLoaded { rows: rows_for(addr(1)) }, &mut model);
        let _ = app.update(
            Event::FetchFailed {
                message: "offline".to_string(),
            },
            &mut model,
        );

        let view = app.view(&model);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.fetch_error.as_deref(), Some("offline"));
    }

    #[test]
    fn test_new_question_requires_deployment() {
        let (app, mut model) = started(addr(1), None);
        let _ = app.update(Event::NewQuestion, &mut model);
        assert_eq!(model.screen, Screen::Questions);
        assert_eq!(model.popup.as_ref().map(|p| p.kind), Some(PopupKind::Error));

        let _ = app.update(Event::Deployed { config: config() }, &mut model);
        let _ = app.update(Event::DismissMessage, &mut model);
        let _ = app.update(Event::NewQuestion, &mut model);
        assert_eq!(model.screen, Screen::NewQuestion);
        assert_eq!(model.question_draft, DEFAULT_QUESTION);
        assert!(model.popup.is_none());
    }

    #[test]
    fn test_select_answerable_question() {
        let (app, mut model) = started(addr(1), Some(config()));
        let rows = rows_for(addr(1));
        let theirs = rows[1].request_id;
        let mine = rows[0].request_id;
        let _ = app.update(Event::RowsLoaded { rows }, &mut model);

        let _ = app.update(Event::SelectQuestion { request_id: mine }, &mut model);
        assert_eq!(model.screen, Screen::Questions);

        let _ = app.update(Event::SelectQuestion { request_id: theirs }, &mut model);
        assert_eq!(model.screen, Screen::AnswerQuestion);
        assert_eq!(model.answer_draft, DEFAULT_ANSWER);
        assert_eq!(app.view(&model).selected.unwrap().question, "theirs?");

        let _ = app.update(Event::Back, &mut model);
        assert_eq!(model.screen, Screen::Questions);
        assert!(model.selected.is_none());
    }

    #[test]
    fn test_action_lifecycle_marks_pending() {
        let (app, mut model) = started(addr(1), Some(config()));
        let rows = rows_for(addr(1));
        let mine = rows[0].request_id;
        let _ = app.update(Event::RowsLoaded { rows }, &mut model);

        let _ = app.update(Event::ActionStarted { request_id: mine }, &mut model);
        assert!(app.view(&model).rows[0].pending);

        let _ = app.update(
            Event::ActionFailed {
                request_id: Some(mine),
                message: "action rejected: nope".to_string(),
            },
            &mut model,
        );
        assert!(!app.view(&model).rows[0].pending);
        assert_eq!(model.popup.as_ref().map(|p| p.kind), Some(PopupKind::Error));

        let _ = app.update(Event::ActionStarted { request_id: mine }, &mut model);
        let _ = app.update(
            Event::ActionSucceeded {
                request_id: mine,
                tx_hash: TxHash::default(),
            },
            &mut model,
        );
        assert!(model.pending.is_empty());
        assert_eq!(model.popup.as_ref().map(|p| p.kind), Some(PopupKind::Info));
    }

    #[test]
    fn test_balances_rendered() {
        let (app, mut model) = started(addr(1), Some(config()));
        let _ = app.update(
            Event::BalancesUpdated {
                balances: Balances {
                    private: Some(1000),
                    public: Some(5),
                },
            },
            &mut model,
        );
        let view = app.view(&model);
        assert_eq!(view.private_balance, "1000");
        assert_eq!(view.public_balance, "5");
    }

    #[test]
    fn test_double_deploy_reports_error() {
        let (app, mut model) = started(addr(1), Some(config()));
        let _ = app.update(Event::Deployed { config: config() }, &mut model);
        assert_eq!(model.popup.as_ref().map(|p| p.kind), Some(PopupKind::Error));
    }

    #[test]
    fn test_notice_shows_info_without_touching_rows() {
        let (app, mut model) = started(addr(1), Some(config()));
        let _ = app.update(Event::NewQuestion, &mut model);
        let _ = app.update(
            Event::Notice {
                message: "minted 1000 tokens".into(),
            },
            &mut model,
        );
        let view = app.view(&model);
        assert_eq!(
            view.popup,
            Some(Popup {
                kind: PopupKind::Info,
                message: "minted 1000 tokens".into(),
            })
        );
        assert_eq!(model.screen, Screen::NewQuestion);

        let _ = app.update(Event::DismissMessage, &mut model);
        assert!(app.view(&model).popup.is_none());
    }
}
