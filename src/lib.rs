pub mod models;
pub mod parser;
pub mod error;
pub mod config;
pub mod client;
pub mod events;
pub mod tracking;
pub mod surface;
pub mod renderer;
pub mod selection;
pub mod player;
pub mod headless;

pub use client::{HttpFetcher, VastClient, VastFetcher};
pub use config::{PlayerConfig, PlayerOptions};
pub use error::{PlayerError, PlayerResult, VastError};
pub use events::{AdEvent, Emitter, EventEmitter, EventProxy, Value};
pub use player::VastPlayer;
pub use renderer::{AdState, Renderer, RendererKind};
pub use selection::{Selection, select_creative};
pub use tracking::{HttpPixelTransport, PixelReporter, PixelTransport, TrackingMapper};
