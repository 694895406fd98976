//! Wire format types for each vendor's API
//!
//! Pure serde structs used only at the adapter boundary.

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
