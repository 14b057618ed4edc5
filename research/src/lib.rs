//! Engine players and multi-engine research on top of `usi-engine`.

pub mod manager;
pub mod player;
pub mod settings;

pub use manager::{ResearchError, ResearchEvent, ResearchManager, POSITION_DEBOUNCE};
pub use player::{
    MateReceiver, Player, PlayerError, PlayerEvent, SearchInfo, SearchInfoUpdate, SearchReceiver,
    SearchResult, INFO_FLUSH_WINDOW,
};
pub use settings::{ResearchSettings, SecondaryEngine};
