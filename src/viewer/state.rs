//! Shell lifecycle state

/// Where the viewer is in its open/close lifecycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ViewerState {
    #[default]
    Closed,
    Loading,
    Ready,
    /// Loading failed; holds the message shown to the user
    Error(String),
}

impl ViewerState {
    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self, ViewerState::Closed)
    }

    /// Escape only dismisses a viewer that has settled
    #[must_use]
    pub fn accepts_escape(&self) -> bool {
        matches!(self, ViewerState::Ready | ViewerState::Error(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            ViewerState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Lifecycle commands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Open,
    LoadSucceeded,
    LoadFailed(String),
    Retry,
    Close,
}

/// Side effects of a lifecycle transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    ClearError,
    LockScroll,
    PickInitialScale,
    InstallGuards,
    StartLoad,
    DocumentReady,
    ShowError(String),
    ReleaseDocument,
    RestoreScroll,
    RemoveGuards,
}

impl ViewerState {
    /// Apply a command and return resulting effects
    ///
    /// Commands that make no sense in the current state are ignored and
    /// produce no effects.
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        let (next, effects) = match (&*self, cmd) {
            (ViewerState::Closed, Command::Open) | (ViewerState::Error(_), Command::Retry) => {
                (ViewerState::Loading, Self::load_effects())
            }

            // a new document replaces the open one, pages and handle included
            (_, Command::Open) => {
                let mut effects = vec![Effect::ReleaseDocument];
                effects.extend(Self::load_effects());
                (ViewerState::Loading, effects)
            }

            (ViewerState::Loading, Command::LoadSucceeded) => {
                (ViewerState::Ready, vec![Effect::DocumentReady])
            }

            (ViewerState::Loading, Command::LoadFailed(message)) => (
                ViewerState::Error(message.clone()),
                vec![Effect::ShowError(message)],
            ),

            (ViewerState::Loading | ViewerState::Ready | ViewerState::Error(_), Command::Close) => (
                ViewerState::Closed,
                vec![
                    Effect::ReleaseDocument,
                    Effect::RestoreScroll,
                    Effect::RemoveGuards,
                ],
            ),

            (state, cmd) => {
                log::trace!("ignoring {cmd:?} while {state:?}");
                return vec![];
            }
        };

        *self = next;
        effects
    }

    fn load_effects() -> Vec<Effect> {
        vec![
            Effect::ClearError,
            Effect::LockScroll,
            Effect::PickInitialScale,
            Effect::InstallGuards,
            Effect::StartLoad,
        ]
    }
}
