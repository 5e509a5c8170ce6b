mod list;
mod offline;
mod scan;

pub(crate) use list::list_command;
pub(crate) use offline::{parse_command, tlv_command};
pub(crate) use scan::scan_command;
