// Automation module - decides what to do on each game event and does it

mod dispatcher;
mod settings;
mod state_machine;

#[cfg(test)]
mod tests;

pub use dispatcher::{
  champ_select_action_path, ActionDispatcher, MY_SELECTION_PATH, READY_CHECK_ACCEPT_PATH,
};
pub use settings::AutomationSettings;
pub use state_machine::{
  Action, ActionFailure, ActionKey, ActionOutcome, AutomationState, AutomationStateMachine,
  ErrorScope,
};
