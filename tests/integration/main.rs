//! Integration tests: a live relay on an ephemeral port, driven through
//! the relay client, the overlay documents, and the control panel.

mod mock_quotes;
mod relay;
