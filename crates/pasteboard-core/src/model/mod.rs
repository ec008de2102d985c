//! Record/entry model of a clipboard payload and its binary encoding.
//!
//! # How a payload is shaped (for beginners)
//!
//! A [`PasteData`] is what one "copy" produces.  It holds an ordered list of
//! [`PasteRecord`]s (think: one record per selected item), and each record
//! holds one or more [`PasteDataEntry`]s, the same item in different formats
//! (plain text *and* HTML, for instance).
//!
//! An entry may be *unresolved*: the producer only advertised the type and
//! promised to supply the value later.  The service resolves such entries
//! on demand when a reader asks for them.

pub mod codec;
pub mod entry;
pub mod mime;
pub mod paste_data;
pub mod record;

pub use codec::{decode_entry, decode_paste_data, encode_entry, encode_paste_data};
pub use entry::{EntryValue, PasteDataEntry, PixelMap, Want};
pub use mime::is_basic_type;
pub use paste_data::{
    PasteData, PasteDataProperty, ScreenStatus, ShareOption, MAX_RECORD_COUNT,
};
pub use record::PasteRecord;
