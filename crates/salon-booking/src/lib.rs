pub mod agent;
pub mod api;
pub mod booking_db;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod metrics;
pub mod scheduling;
pub mod seed;
pub mod server;
pub mod shared_state;
pub mod telemetry;
pub mod utils;

// Public API exports
pub use agent::{BookingTools, ChatAgent, ChatModel, OpenAiChatModel};
pub use booking_db::BookingDatabase;
pub use config::Config;
pub use error::{BookingError, BookingResult, ExternalFailure};
pub use memory::{InMemoryMemoryStore, MemoryStore, Message};
pub use scheduling::{AppointmentStatus, OperatingHours, TransitionPolicy};
pub use server::run_server;
