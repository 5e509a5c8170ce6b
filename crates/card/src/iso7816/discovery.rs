//! Application discovery
//!
//! Each [`AppConfig`] names the AIDs one application family may answer to and
//! what to harvest once selected. Discovery walks the configurations in order
//! and keeps one [`Application`] per configuration that matched.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use bytes::Bytes;
use farecard_apdu_core::{Error, Iso7816Protocol, Result, Transceiver};
use tracing::{debug, instrument, trace};

use super::model::{Application, File, Iso7816Capture};

/// Protocol handle passed to proprietary readers
pub type Protocol<'a> = Iso7816Protocol<&'a mut dyn Transceiver>;

/// Reads purse balances, keyed by balance index
pub type BalanceReader = fn(&mut Protocol<'_>) -> Result<BTreeMap<usize, Bytes>>;

/// Reads proprietary data, keyed by the name to store it under
pub type ExtraDataReader = fn(&mut Protocol<'_>) -> Result<BTreeMap<String, Bytes>>;

/// Highest record number tried per file
const MAX_RECORD: u8 = 255;

/// An explicitly selected elementary file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSelector {
    /// DF to select first, relative to the application
    pub parent_df: Option<u16>,
    /// File id
    pub file_id: u16,
}

impl FileSelector {
    /// A file directly under the application
    pub const fn new(file_id: u16) -> Self {
        Self {
            parent_df: None,
            file_id,
        }
    }

    /// A file under a sub-DF
    pub const fn under(parent_df: u16, file_id: u16) -> Self {
        Self {
            parent_df: Some(parent_df),
            file_id,
        }
    }

    /// Key the file is stored under
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FileSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_df {
            Some(parent) => write!(f, "{parent:x}/{:x}", self.file_id),
            None => write!(f, "{:x}", self.file_id),
        }
    }
}

/// One application family to look for
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// AIDs to try, in order
    pub app_names: Vec<Bytes>,
    /// Family tag recorded on the application
    pub type_tag: String,
    /// Balance reader run after the files
    pub read_balances: Option<BalanceReader>,
    /// Proprietary data reader run after the balances
    pub read_extra_data: Option<ExtraDataReader>,
    /// SFIs to scan
    pub sfi_range: RangeInclusive<u8>,
    /// Files to select explicitly
    pub file_selectors: Vec<FileSelector>,
}

impl AppConfig {
    /// Configuration scanning all SFIs and nothing else
    pub fn new<I, A>(type_tag: impl Into<String>, app_names: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Self {
            app_names: app_names.into_iter().map(Into::into).collect(),
            type_tag: type_tag.into(),
            read_balances: None,
            read_extra_data: None,
            sfi_range: 0..=31,
            file_selectors: Vec::new(),
        }
    }

    /// Set the balance reader
    pub fn with_balances(mut self, reader: BalanceReader) -> Self {
        self.read_balances = Some(reader);
        self
    }

    /// Set the proprietary data reader
    pub fn with_extra_data(mut self, reader: ExtraDataReader) -> Self {
        self.read_extra_data = Some(reader);
        self
    }

    /// Restrict the SFI scan
    pub fn with_sfi_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.sfi_range = range;
        self
    }

    /// Set the explicit file selectors
    pub fn with_file_selectors(mut self, selectors: impl IntoIterator<Item = FileSelector>) -> Self {
        self.file_selectors = selectors.into_iter().collect();
        self
    }
}

/// Read records from 1 until the card stops answering
fn read_records(
    protocol: &mut Protocol<'_>,
    mut read: impl FnMut(&mut Protocol<'_>, u8) -> Result<Option<Bytes>>,
) -> Result<BTreeMap<u8, Bytes>> {
    let mut records = BTreeMap::new();
    for number in 1..=MAX_RECORD {
        match read(protocol, number) {
            Ok(Some(record)) => {
                records.insert(number, record);
            }
            Ok(None) | Err(Error::EndOfFile) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

/// Binary reads treat end of file as "no data"
fn binary_or_none(result: Result<Option<Bytes>>) -> Result<Option<Bytes>> {
    match result {
        Err(Error::EndOfFile) => Ok(None),
        other => other,
    }
}

fn read_sfi_file(protocol: &mut Protocol<'_>, sfi: u8) -> Result<Option<File>> {
    let records = read_records(protocol, |p, n| p.read_record_sfi(sfi, n))?;
    let binary = binary_or_none(protocol.read_binary_sfi(sfi))?;
    Ok(File::new(binary, records, None))
}

/// Turn any refusal into "skip this selector", keeping transport failures
fn refused_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            trace!(error = %e, "Selector refused");
            Ok(None)
        }
    }
}

fn read_selected_file(
    protocol: &mut Protocol<'_>,
    selector: FileSelector,
    aid: &[u8],
) -> Result<Option<File>> {
    if let Some(parent) = selector.parent_df {
        if refused_as_none(protocol.select_by_name(aid, false))?.is_none()
            || refused_as_none(protocol.select_by_id(parent))?.is_none()
        {
            return Ok(None);
        }
    }

    // Drop whatever file a previous selector left current
    refused_as_none(protocol.unselect())?;

    let Some(fci) = refused_as_none(protocol.select_by_id(selector.file_id))? else {
        return Ok(None);
    };
    let records = read_records(protocol, |p, n| p.read_record(n))?;
    let binary = binary_or_none(protocol.read_binary())?;
    Ok(File::new(binary, records, Some(fci)))
}

fn read_application(protocol: &mut Protocol<'_>, config: &AppConfig) -> Result<Option<Application>> {
    let mut selected = None;
    for aid in &config.app_names {
        if let Some(fci) = protocol.select_by_name_or_none(aid)? {
            selected = Some((aid.clone(), fci));
            break;
        }
        debug!(aid = %hex::encode(aid), "AID not present");
    }
    let Some((aid, fci)) = selected else {
        return Ok(None);
    };

    let mut sfi_files = BTreeMap::new();
    for sfi in config.sfi_range.clone() {
        if let Some(file) = read_sfi_file(protocol, sfi)? {
            sfi_files.insert(sfi, file);
        }
    }

    let mut files = BTreeMap::new();
    for selector in &config.file_selectors {
        if let Some(file) = read_selected_file(protocol, *selector, &aid)? {
            files.insert(selector.key(), file);
        }
    }

    if let Some(read_balances) = config.read_balances {
        for (index, balance) in read_balances(protocol)? {
            files.insert(format!("balance/{index}"), File::from_binary(balance));
        }
    }
    if let Some(read_extra_data) = config.read_extra_data {
        for (key, data) in read_extra_data(protocol)? {
            files.insert(key, File::from_binary(data));
        }
    }

    debug!(
        aid = %hex::encode(&aid),
        type_tag = %config.type_tag,
        sfis = sfi_files.len(),
        files = files.len(),
        "Application read"
    );
    Ok(Some(Application {
        aid,
        fci,
        files,
        sfi_files,
        type_tag: config.type_tag.clone(),
    }))
}

/// Probe a card for every configured application
///
/// Returns `Ok(None)` when no configuration matched, which means the card does
/// not speak any known ISO 7816 application. Only transport failures are
/// returned as errors.
#[instrument(skip_all, fields(configs = configs.len()))]
pub fn discover(
    configs: &[AppConfig],
    transceiver: &mut dyn Transceiver,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<Option<Iso7816Capture>> {
    let mut protocol: Protocol<'_> = Iso7816Protocol::new(transceiver);
    let mut applications = Vec::new();

    for (index, config) in configs.iter().enumerate() {
        progress(index, configs.len());
        if let Some(app) = read_application(&mut protocol, config)? {
            applications.push(app);
        }
    }

    if applications.is_empty() {
        return Ok(None);
    }
    Ok(Some(Iso7816Capture { applications }))
}
