//! Account state machine
//!
//! Pure state machine: receives step results, returns (new_state, action).
//! `AccountSession::run` executes the I/O implied by each action.
//!
//! ```text
//! Init → Authenticating → Syncing → [CompletingTasks] → [CheckingIn]
//!      → Pinging → FinalSyncing → Done(Finished)
//! ```
//!
//! A failed sync ends the run as `Skipped`; a failed token acquisition or a
//! fatal error in any later step ends it as `Aborted`.

/// How an account run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Skipped,
    Aborted,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Finished => "finished",
            Outcome::Skipped => "skipped",
            Outcome::Aborted => "aborted",
        }
    }
}

/// Step currently in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    Init,
    Authenticating,
    Syncing,
    CompletingTasks { checked_in_today: bool },
    CheckingIn,
    Pinging,
    FinalSyncing,
    Done(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    Start,
    TokenAcquired,
    TokenFailed(String),
    Synced { checked_in_today: bool },
    SyncFailed,
    /// Tasks, check-in or ping finished; their failures are not fatal.
    StepDone,
    /// Re-authentication failed mid-run.
    Fatal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountAction {
    AcquireToken,
    Sync,
    CompleteTasks,
    Checkin,
    Ping,
    FinalSync,
    Finish(Outcome),
    None,
}

/// Handle a state transition. Pure function: no I/O.
///
/// `auto_task` decides whether tasks are attempted after the first sync.
pub fn handle_event(
    state: AccountState,
    event: AccountEvent,
    auto_task: bool,
) -> (AccountState, AccountAction) {
    match (state, event) {
        (AccountState::Init, AccountEvent::Start) => {
            (AccountState::Authenticating, AccountAction::AcquireToken)
        }

        (AccountState::Authenticating, AccountEvent::TokenAcquired) => {
            (AccountState::Syncing, AccountAction::Sync)
        }
        (AccountState::Authenticating, AccountEvent::TokenFailed(_)) => finish(Outcome::Aborted),

        (AccountState::Syncing, AccountEvent::SyncFailed) => finish(Outcome::Skipped),
        (AccountState::Syncing, AccountEvent::Synced { checked_in_today }) if auto_task => (
            AccountState::CompletingTasks { checked_in_today },
            AccountAction::CompleteTasks,
        ),
        (AccountState::Syncing, AccountEvent::Synced { checked_in_today }) => {
            after_tasks(checked_in_today)
        }

        (AccountState::CompletingTasks { checked_in_today }, AccountEvent::StepDone) => {
            after_tasks(checked_in_today)
        }

        (AccountState::CheckingIn, AccountEvent::StepDone) => {
            (AccountState::Pinging, AccountAction::Ping)
        }

        (AccountState::Pinging, AccountEvent::StepDone) => {
            (AccountState::FinalSyncing, AccountAction::FinalSync)
        }

        // The final sync only reports; its result does not change the outcome
        (
            AccountState::FinalSyncing,
            AccountEvent::Synced { .. } | AccountEvent::SyncFailed | AccountEvent::StepDone,
        ) => finish(Outcome::Finished),

        (AccountState::Done(outcome), _) => (AccountState::Done(outcome), AccountAction::None),

        (_, AccountEvent::Fatal(_)) => finish(Outcome::Aborted),

        (state, _event) => (state, AccountAction::None),
    }
}

fn finish(outcome: Outcome) -> (AccountState, AccountAction) {
    (AccountState::Done(outcome), AccountAction::Finish(outcome))
}

fn after_tasks(checked_in_today: bool) -> (AccountState, AccountAction) {
    if checked_in_today {
        (AccountState::Pinging, AccountAction::Ping)
    } else {
        (AccountState::CheckingIn, AccountAction::Checkin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `events` from `Init` and collect the actions.
    fn drive(events: Vec<AccountEvent>, auto_task: bool) -> (AccountState, Vec<AccountAction>) {
        let mut state = AccountState::Init;
        let mut actions = Vec::new();
        for event in events {
            let (next, action) = handle_event(state, event, auto_task);
            state = next;
            actions.push(action);
        }
        (state, actions)
    }

    #[test]
    fn full_run_with_tasks_and_checkin() {
        let (state, actions) = drive(
            vec![
                AccountEvent::Start,
                AccountEvent::TokenAcquired,
                AccountEvent::Synced {
                    checked_in_today: false,
                },
                AccountEvent::StepDone,
                AccountEvent::StepDone,
                AccountEvent::StepDone,
                AccountEvent::Synced {
                    checked_in_today: true,
                },
            ],
            true,
        );
        assert_eq!(
            actions,
            vec![
                AccountAction::AcquireToken,
                AccountAction::Sync,
                AccountAction::CompleteTasks,
                AccountAction::Checkin,
                AccountAction::Ping,
                AccountAction::FinalSync,
                AccountAction::Finish(Outcome::Finished),
            ]
        );
        assert_eq!(state, AccountState::Done(Outcome::Finished));
    }

    #[test]
    fn checkin_skipped_when_already_checked_in_today() {
        let (_, actions) = drive(
            vec![
                AccountEvent::Start,
                AccountEvent::TokenAcquired,
                AccountEvent::Synced {
                    checked_in_today: true,
                },
                AccountEvent::StepDone,
            ],
            true,
        );
        assert_eq!(actions[3], AccountAction::Ping);
        assert!(!actions.contains(&AccountAction::Checkin));
    }

    #[test]
    fn tasks_skipped_when_auto_task_disabled() {
        let (state, actions) = drive(
            vec![
                AccountEvent::Start,
                AccountEvent::TokenAcquired,
                AccountEvent::Synced {
                    checked_in_today: false,
                },
            ],
            false,
        );
        assert_eq!(actions[2], AccountAction::Checkin);
        assert_eq!(state, AccountState::CheckingIn);
    }

    #[test]
    fn token_failure_aborts() {
        let (state, actions) = drive(
            vec![
                AccountEvent::Start,
                AccountEvent::TokenFailed("captcha".into()),
            ],
            true,
        );
        assert_eq!(actions[1], AccountAction::Finish(Outcome::Aborted));
        assert_eq!(state, AccountState::Done(Outcome::Aborted));
    }

    #[test]
    fn sync_failure_skips_remaining_steps() {
        let (state, actions) = drive(
            vec![
                AccountEvent::Start,
                AccountEvent::TokenAcquired,
                AccountEvent::SyncFailed,
            ],
            true,
        );
        assert_eq!(actions[2], AccountAction::Finish(Outcome::Skipped));
        assert_eq!(state, AccountState::Done(Outcome::Skipped));
    }

    #[test]
    fn fatal_mid_run_aborts() {
        let (state, action) = handle_event(
            AccountState::CompletingTasks {
                checked_in_today: false,
            },
            AccountEvent::Fatal("re-login failed".into()),
            true,
        );
        assert_eq!(state, AccountState::Done(Outcome::Aborted));
        assert_eq!(action, AccountAction::Finish(Outcome::Aborted));
    }

    #[test]
    fn failed_final_sync_still_finishes() {
        let (state, action) =
            handle_event(AccountState::FinalSyncing, AccountEvent::SyncFailed, true);
        assert_eq!(state, AccountState::Done(Outcome::Finished));
        assert_eq!(action, AccountAction::Finish(Outcome::Finished));
    }

    #[test]
    fn done_is_terminal() {
        let (state, action) = handle_event(
            AccountState::Done(Outcome::Skipped),
            AccountEvent::Fatal("late".into()),
            true,
        );
        assert_eq!(state, AccountState::Done(Outcome::Skipped));
        assert_eq!(action, AccountAction::None);
    }

    #[test]
    fn unexpected_event_keeps_state() {
        let (state, action) = handle_event(AccountState::Pinging, AccountEvent::TokenAcquired, true);
        assert_eq!(state, AccountState::Pinging);
        assert_eq!(action, AccountAction::None);
    }
}
