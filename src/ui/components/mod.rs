mod command_input;
mod form_panel;
mod input;
mod key_result;
mod search_input;
mod status_line;

pub use command_input::{CommandEvent, CommandInput};
pub use form_panel::{FormEvent, FormPanel};
pub use key_result::KeyResult;
pub use search_input::{SearchEvent, SearchInput};
pub use status_line::MutationSlot;
