//! Job list loading and serialization.
//!
//! The document is kept as the exact sequence of markup events it was read
//! from. Job items only record which slice of that sequence they occupy, so
//! removing an item drops its events and everything else is written back
//! untouched.
//!
//! `Name` text is taken verbatim, so `" A "` and `"A"` are different jobs.
//! `Folder` text is trimmed since it is used as a directory name.
use crate::error::{DedupError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const ITEM_TAG: &[u8] = b"Item";
pub const NAME_TAG: &[u8] = b"Name";
pub const FOLDER_TAG: &[u8] = b"Folder";
pub const STATUS_ATTR: &[u8] = b"Status";

/// Stable identity of a job item, assigned in document order at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ItemId(usize);

impl ItemId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One `<Item>` entry of the job list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobItem {
    pub id: ItemId,
    pub name: String,
    pub status: Option<String>,
    /// Directory name of the job; later stamps sort as newer.
    pub folder_stamp: String,
    #[serde(skip)]
    events: Range<usize>,
}

/// A parsed job list together with the file it came from.
#[derive(Debug, Clone)]
pub struct JobList {
    source: PathBuf,
    events: Vec<Event<'static>>,
    skipped: Vec<bool>,
    items: Vec<JobItem>,
}

impl JobList {
    /// Read and parse the job list at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|err| DedupError::Parse {
            path: path.to_path_buf(),
            reason: format!("read failed: {err}"),
        })?;
        let text = String::from_utf8(bytes).map_err(|err| DedupError::Parse {
            path: path.to_path_buf(),
            reason: format!("not valid UTF-8: {err}"),
        })?;
        Self::parse(path, &text)
    }

    /// Parse job list markup; `source` is only used for reporting and as the
    /// default write target.
    pub fn parse(source: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let source = source.into();
        let parse_error = |reason: String| DedupError::Parse {
            path: source.clone(),
            reason,
        };

        let mut reader = Reader::from_str(text);
        let mut events: Vec<Event<'static>> = Vec::new();
        let mut items = Vec::new();
        let mut open: Option<ItemBuilder> = None;
        let mut depth = 0usize;
        let mut seen_root = false;

        loop {
            let event = reader.read_event().map_err(|err| {
                parse_error(format!("{err} (near byte {})", reader.buffer_position()))
            })?;
            let index = events.len();
            match &event {
                Event::Start(start) | Event::Empty(start) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    if depth == 0 {
                        if seen_root {
                            return Err(parse_error("more than one root element".to_string()));
                        }
                        seen_root = true;
                    }
                    match open.as_mut() {
                        None if start.name().as_ref() == ITEM_TAG => {
                            let status = status_of(start).map_err(parse_error)?;
                            let builder = ItemBuilder::open(index, depth, status);
                            if self_closing {
                                let id = ItemId(items.len());
                                items.push(builder.finish(id, index).map_err(parse_error)?);
                            } else {
                                open = Some(builder);
                            }
                        }
                        Some(builder) if depth == builder.depth + 1 => {
                            builder.open_field(start.name().as_ref());
                            if self_closing {
                                builder.close_field();
                            }
                        }
                        _ => {}
                    }
                    if !self_closing {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| parse_error("unexpected closing tag".to_string()))?;
                    if let Some(builder) = open.as_mut() {
                        if depth == builder.depth {
                            if let Some(builder) = open.take() {
                                let id = ItemId(items.len());
                                items.push(builder.finish(id, index).map_err(parse_error)?);
                            }
                        } else if depth == builder.depth + 1 {
                            builder.close_field();
                        }
                    }
                }
                Event::Text(text) => {
                    if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(parse_error("text outside the root element".to_string()));
                    }
                    if let Some(builder) = open.as_mut().filter(|builder| builder.capturing()) {
                        let value = text
                            .unescape()
                            .map_err(|err| parse_error(format!("bad text content: {err}")))?;
                        builder.buffer.push_str(&value);
                    }
                }
                Event::CData(data) => {
                    if let Some(builder) = open.as_mut().filter(|builder| builder.capturing()) {
                        builder.buffer.push_str(&String::from_utf8_lossy(data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            events.push(event.into_owned());
        }

        if depth != 0 {
            return Err(parse_error("document ends inside an open element".to_string()));
        }
        if !seen_root {
            return Err(parse_error("no root element".to_string()));
        }

        let skipped = vec![false; events.len()];
        Ok(Self {
            source,
            events,
            skipped,
            items,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Items still present in the document, in document order.
    pub fn items(&self) -> &[JobItem] {
        &self.items
    }

    /// Drop the given items from the document and return them.
    ///
    /// The whitespace run directly in front of a removed item goes with it so
    /// the remaining entries keep their layout.
    pub fn remove(&mut self, ids: &[ItemId]) -> Vec<JobItem> {
        let (removed, kept): (Vec<JobItem>, Vec<JobItem>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| ids.contains(&item.id));
        self.items = kept;

        for item in &removed {
            let start = item.events.start;
            if let Some(Event::Text(text)) = start.checked_sub(1).and_then(|i| self.events.get(i)) {
                if text.iter().all(u8::is_ascii_whitespace) {
                    self.skipped[start - 1] = true;
                }
            }
            for index in item.events.clone() {
                self.skipped[index] = true;
            }
        }
        removed
    }

    /// Serialize the remaining document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for (event, skipped) in self.events.iter().zip(&self.skipped) {
            if *skipped {
                continue;
            }
            writer
                .write_event(event.borrow())
                .map_err(|err| DedupError::Serialize(err.to_string()))?;
        }
        Ok(writer.into_inner())
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Name,
    Folder,
}

struct ItemBuilder {
    start: usize,
    depth: usize,
    status: Option<String>,
    name: Option<String>,
    folder: Option<String>,
    capture: Option<Field>,
    buffer: String,
}

impl ItemBuilder {
    fn open(start: usize, depth: usize, status: Option<String>) -> Self {
        Self {
            start,
            depth,
            status,
            name: None,
            folder: None,
            capture: None,
            buffer: String::new(),
        }
    }

    fn capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn open_field(&mut self, tag: &[u8]) {
        self.capture = match tag {
            NAME_TAG if self.name.is_none() => Some(Field::Name),
            FOLDER_TAG if self.folder.is_none() => Some(Field::Folder),
            _ => None,
        };
        self.buffer.clear();
    }

    fn close_field(&mut self) {
        match self.capture.take() {
            Some(Field::Name) => self.name = Some(std::mem::take(&mut self.buffer)),
            Some(Field::Folder) => self.folder = Some(self.buffer.trim().to_string()),
            None => {}
        }
    }

    fn finish(self, id: ItemId, end: usize) -> std::result::Result<JobItem, String> {
        let missing = |tag: &[u8]| {
            format!(
                "item #{} has no <{}> element",
                id.index() + 1,
                String::from_utf8_lossy(tag)
            )
        };
        let name = self.name.ok_or_else(|| missing(NAME_TAG))?;
        let folder_stamp = self.folder.ok_or_else(|| missing(FOLDER_TAG))?;
        Ok(JobItem {
            id,
            name,
            status: self.status,
            folder_stamp,
            events: self.start..end + 1,
        })
    }
}

fn status_of(start: &BytesStart<'_>) -> std::result::Result<Option<String>, String> {
    let Some(attr) = start
        .try_get_attribute(STATUS_ATTR)
        .map_err(|err| format!("bad attribute: {err}"))?
    else {
        return Ok(None);
    };
    let value = attr
        .unescape_value()
        .map_err(|err| format!("bad Status attribute: {err}"))?;
    Ok(Some(value.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- controller job list -->
<JobList version="3">
  <Item Status="Done">
    <Name>A</Name>
    <Folder>2023-01-01</Folder>
    <Extra keep="yes">x &amp; y</Extra>
  </Item>
  <Item Status="Queued">
    <Name>A</Name>
    <Folder> 2023-06-01 </Folder>
  </Item>
  <Item>
    <Name><![CDATA[B]]></Name>
    <Folder>2023-01-01</Folder>
  </Item>
</JobList>
"#;

    #[test]
    fn parse_reads_items_in_document_order() {
        let list = JobList::parse("jobs.xml", SAMPLE).expect("parse");
        let summary: Vec<_> = list
            .items()
            .iter()
            .map(|item| {
                (
                    item.id.index(),
                    item.name.as_str(),
                    item.status.as_deref(),
                    item.folder_stamp.as_str(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "A", Some("Done"), "2023-01-01"),
                (1, "A", Some("Queued"), "2023-06-01"),
                (2, "B", None, "2023-01-01"),
            ]
        );
        assert_eq!(list.source(), Path::new("jobs.xml"));
    }

    #[test]
    fn unmodified_list_round_trips_byte_for_byte() {
        let list = JobList::parse("jobs.xml", SAMPLE).expect("parse");
        let bytes = list.to_bytes().expect("serialize");
        assert_eq!(String::from_utf8(bytes).expect("utf8"), SAMPLE);
    }

    #[test]
    fn remove_drops_item_and_its_indentation() {
        let mut list = JobList::parse("jobs.xml", SAMPLE).expect("parse");
        let first = list.items()[0].id;
        let removed = list.remove(&[first]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].folder_stamp, "2023-01-01");
        assert_eq!(list.items().len(), 2);
        assert!(list.items().iter().all(|item| item.id != first));

        let text = String::from_utf8(list.to_bytes().expect("serialize")).expect("utf8");
        assert!(!text.contains("<Extra"));
        assert!(text.contains("<JobList version=\"3\">\n  <Item Status=\"Queued\">"));

        let reparsed = JobList::parse("jobs.xml", &text).expect("reparse");
        let names: Vec<_> = reparsed
            .items()
            .iter()
            .map(|item| (item.name.as_str(), item.folder_stamp.as_str()))
            .collect();
        assert_eq!(names, vec![("A", "2023-06-01"), ("B", "2023-01-01")]);
    }

    #[test]
    fn name_text_is_kept_verbatim() {
        let text = "<JobList><Item><Name> A </Name><Folder>1</Folder></Item></JobList>";
        let list = JobList::parse("padded.xml", text).expect("parse");
        assert_eq!(list.items()[0].name, " A ");
    }

    #[test]
    fn items_below_nested_containers_are_found() {
        let text = "<Root><Jobs><Item><Name>n</Name><Folder>f</Folder></Item></Jobs></Root>";
        let list = JobList::parse("nested.xml", text).expect("parse");
        assert_eq!(list.items().len(), 1);
        assert_eq!(list.items()[0].name, "n");
    }

    #[test]
    fn malformed_markup_is_a_parse_error() {
        for text in [
            "",
            "<JobList><Item></JobList>",
            "<JobList><Item><Name>a</Name>",
            "<JobList/><Other/>",
            "stray <JobList/>",
        ] {
            let err = JobList::parse("bad.xml", text).expect_err(text);
            assert!(matches!(err, DedupError::Parse { .. }), "{text}: {err}");
        }
    }

    #[test]
    fn item_without_folder_is_rejected() {
        let text = "<JobList><Item><Name>a</Name></Item></JobList>";
        let err = JobList::parse("bad.xml", text).expect_err("missing folder");
        assert!(err.to_string().contains("<Folder>"), "{err}");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = JobList::load(&dir.path().join("absent.xml")).expect_err("missing");
        assert!(matches!(err, DedupError::Parse { .. }));
    }
}
