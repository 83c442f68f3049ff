use crate::error::{MmsMediaError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Contact name the backup app emits when it could not resolve the sender.
const UNKNOWN_CONTACT: &str = "(Unknown)";

/// Declared-filename sentinel meaning "no name was recorded, generate one".
const GENERATE_NAME: &str = "null";

/// Grouping key when neither contact name nor address is usable.
pub const FALLBACK_FOLDER: &str = "_Unknown";

/// One media part of an MMS message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub content_type: String,
    /// `None` when the backup recorded the "null" sentinel.
    pub declared_name: Option<String>,
    /// Raw base64 payload as it appears in the document.
    pub data: String,
}

/// One `mms` element: the unit of work handed to an extraction worker.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub address: Option<String>,
    pub contact_name: Option<String>,
    /// Logical message timestamp, milliseconds since the epoch.
    pub date_ms: Option<i64>,
    pub attachments: Vec<Attachment>,
}

impl MessageRecord {
    /// Output subdirectory and dedup partition key: contact name, falling
    /// back to the address when the contact is unresolved, then to a fixed
    /// sentinel.
    pub fn folder_key(&self) -> String {
        match self.contact_name.as_deref() {
            Some(name) if name != UNKNOWN_CONTACT && !name.is_empty() => name.to_string(),
            _ => self
                .address
                .clone()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| FALLBACK_FOLDER.to_string()),
        }
    }
}

/// Streaming source of `MessageRecord`s from one backup document.
///
/// Records are materialized one at a time and the event buffer is cleared
/// after every event, so memory stays bounded regardless of document size.
/// The stream is forward-only and non-restartable.
pub struct MessageStream {
    reader: Reader<BufReader<File>>,
    path: PathBuf,
    buf: Vec<u8>,
    finished: bool,
}

impl MessageStream {
    /// Open a backup document. `permissive` relaxes end-tag name checking so
    /// oversized or sloppily repaired exports still stream.
    pub fn open<P: AsRef<Path>>(path: P, permissive: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = Reader::from_reader(BufReader::new(file));
        reader.trim_text(true);
        reader.check_end_names(!permissive);

        Ok(Self {
            reader,
            path,
            buf: Vec::new(),
            finished: false,
        })
    }

    /// Advance to the next `mms` record, or `None` at end of document.
    pub fn next_record(&mut self) -> Result<Option<MessageRecord>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            self.buf.clear();
            // The event borrows the buffer, so the error arm must resolve
            // before any further &mut self call.
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(error) => return Err(self.parse_error(error)),
            };

            match event {
                Event::Start(ref e) if e.name().as_ref() == b"mms" => {
                    // Detach the start tag from the buffer before descending
                    let start = e.to_owned();
                    let record = self.read_record(&start)?;
                    return Ok(Some(record));
                }
                // A self-closing mms carries no parts but is still a record.
                Event::Empty(ref e) if e.name().as_ref() == b"mms" => {
                    return Ok(Some(record_from_mms_attributes(e)));
                }
                Event::Eof => {
                    self.finished = true;
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    /// Consume events until the matching `</mms>`, collecting media parts.
    fn read_record(&mut self, mms_start: &BytesStart<'_>) -> Result<MessageRecord> {
        let mut record = record_from_mms_attributes(mms_start);
        let mut depth = 1usize;

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(error) => return Err(self.parse_error(error)),
            };

            match event {
                Event::Start(ref e) => {
                    depth += 1;
                    if e.name().as_ref() == b"part" {
                        if let Some(attachment) = attachment_from_part(e) {
                            record.attachments.push(attachment);
                        }
                    }
                }
                Event::Empty(ref e) => {
                    if e.name().as_ref() == b"part" {
                        if let Some(attachment) = attachment_from_part(e) {
                            record.attachments.push(attachment);
                        }
                    }
                }
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(record);
                    }
                }
                Event::Eof => {
                    self.finished = true;
                    return Err(MmsMediaError::XmlParse {
                        path: self.path.display().to_string(),
                        message: "document ended inside an mms element".to_string(),
                    });
                }
                _ => {}
            }
        }
    }

    fn parse_error(&self, error: quick_xml::Error) -> MmsMediaError {
        MmsMediaError::XmlParse {
            path: self.path.display().to_string(),
            message: error.to_string(),
        }
    }
}

impl Iterator for MessageStream {
    type Item = Result<MessageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn record_from_mms_attributes(e: &BytesStart<'_>) -> MessageRecord {
    let mut record = MessageRecord {
        address: None,
        contact_name: None,
        date_ms: None,
        attachments: Vec::new(),
    };

    for attr in e.attributes().filter_map(|a| a.ok()) {
        let Ok(value) = attr.unescape_value() else {
            continue;
        };
        match attr.key.as_ref() {
            b"address" => record.address = non_null(&value),
            b"contact_name" => record.contact_name = non_null(&value),
            b"date" => record.date_ms = value.parse().ok(),
            _ => {}
        }
    }

    record
}

fn attachment_from_part(e: &BytesStart<'_>) -> Option<Attachment> {
    let mut content_type = None;
    let mut declared_name = None;
    let mut data = None;

    for attr in e.attributes().filter_map(|a| a.ok()) {
        let Ok(value) = attr.unescape_value() else {
            continue;
        };
        match attr.key.as_ref() {
            b"ct" => content_type = Some(value.into_owned()),
            b"cl" => {
                if value != GENERATE_NAME {
                    declared_name = Some(value.into_owned());
                }
            }
            b"data" => data = Some(value.into_owned()),
            _ => {}
        }
    }

    Some(Attachment {
        content_type: content_type?,
        declared_name,
        data: data?,
    })
}

fn non_null(value: &str) -> Option<String> {
    if value == GENERATE_NAME {
        None
    } else {
        Some(value.to_string())
    }
}
