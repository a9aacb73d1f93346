mod server;
mod wire;

pub use server::{API_BASE_URL, HttpRemoteSync, endpoint_url};
pub use wire::{SaveUnitLocationInput, SaveUnitStatusInput};
