//! Extracts the handful of property-list fields needed to render a document
//! out of a recovered archive's `Document.archive` entry.
//!
//! Grounded on `original_source/procreate_repair/procreate_drawing.py`'s
//! `ProcreateDrawing`: the property list is an NSKeyedArchiver object graph —
//! a flat `$objects` table where non-scalar fields hold integer ("UID")
//! back-references that must be dereferenced one or two levels deep.

use std::io::Read;

use regex::Regex;
use std::sync::LazyLock;
use zip::ZipArchive;

use crate::error::SalvageError;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// The fields `SPEC_FULL.md` §6 names as needed for rendering.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub name: String,
    pub tile_size: u32,
    pub orientation: u8,
    pub flipped_horizontally: bool,
    pub flipped_vertically: bool,
    pub width: u32,
    pub height: u32,
    pub composite_uuid: Option<String>,
    pub layer_uuids: Vec<String>,
    pub unwrapped_layer_uuids: Vec<String>,
}

/// Reads `Document.archive` out of a recovered (or hand-built) ZIP archive and
/// dereferences the NSKeyedArchiver object graph.
pub struct DocumentReader {
    objects: Vec<plist::Value>,
}

impl DocumentReader {
    /// Opens the archive's `Document.archive` entry and parses its property list.
    pub fn from_archive<R: Read + std::io::Seek>(
        archive: &mut ZipArchive<R>,
    ) -> Result<Self, SalvageError> {
        let mut file = archive
            .by_name("Document.archive")
            .map_err(|_| SalvageError::MissingResource {
                uuid: "Document.archive".to_string(),
            })?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        drop(file);

        let root = plist::Value::from_reader(std::io::Cursor::new(buf))
            .map_err(|err| SalvageError::CorruptArchiveFragment {
                offset: 0,
                reason: format!("Document.archive is not a valid property list: {err}"),
            })?;
        let objects = root
            .as_dictionary()
            .and_then(|d| d.get("$objects"))
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| SalvageError::CorruptArchiveFragment {
                offset: 0,
                reason: "Document.archive has no $objects table".to_string(),
            })?;

        Ok(DocumentReader { objects })
    }

    fn deref(&self, value: &plist::Value) -> Option<plist::Value> {
        let idx = value.as_unsigned_integer().or_else(|| value.as_uid().map(|u| u.get()))?;
        self.objects.get(idx as usize).cloned()
    }

    /// Resolves a value that may already be a string, or may be a UID pointing
    /// (possibly through one further UID) at a string.
    fn resolve_string(&self, value: &plist::Value) -> Option<String> {
        let mut current = value.clone();
        for _ in 0..3 {
            if let Some(s) = current.as_string() {
                return Some(s.to_string());
            }
            current = self.deref(&current)?;
        }
        current.as_string().map(|s| s.to_string())
    }

    fn root_object(&self) -> Option<&plist::Dictionary> {
        self.objects.get(1).and_then(|v| v.as_dictionary())
    }

    /// Extracts every field `SPEC_FULL.md` names, dereferencing back-references
    /// as needed.
    pub fn read(&self) -> Result<DocumentInfo, SalvageError> {
        let root = self.root_object().ok_or_else(|| SalvageError::CorruptArchiveFragment {
            offset: 0,
            reason: "object 1 (the document root) is not a dictionary".to_string(),
        })?;

        let tile_size = root
            .get("tileSize")
            .and_then(|v| v.as_unsigned_integer())
            .unwrap_or(0) as u32;
        let orientation = root
            .get("orientation")
            .and_then(|v| v.as_unsigned_integer())
            .unwrap_or(1) as u8;
        let flipped_horizontally = root
            .get("flippedHorizontally")
            .and_then(|v| v.as_boolean())
            .unwrap_or(false);
        let flipped_vertically = root
            .get("flippedVertically")
            .and_then(|v| v.as_boolean())
            .unwrap_or(false);

        let name = root
            .get("name")
            .and_then(|v| self.resolve_string(v))
            .unwrap_or_default();

        let (width, height) = root
            .get("size")
            .and_then(|v| self.resolve_string(v))
            .and_then(|s| parse_size(&s))
            .unwrap_or((0, 0));

        let composite_uuid = root.get("composite").and_then(|v| self.deref(v)).and_then(|obj| {
            obj.as_dictionary()
                .and_then(|d| d.get("UUID"))
                .and_then(|u| self.resolve_string(u))
        });

        let layer_uuids = self.resolve_layer_list(root.get("layers"));
        let unwrapped_layer_uuids = self.resolve_layer_list(root.get("unwrappedLayers"));

        Ok(DocumentInfo {
            name,
            tile_size,
            orientation,
            flipped_horizontally,
            flipped_vertically,
            width,
            height,
            composite_uuid,
            layer_uuids,
            unwrapped_layer_uuids,
        })
    }

    fn resolve_layer_list(&self, field: Option<&plist::Value>) -> Vec<String> {
        let Some(field) = field else { return Vec::new() };
        let Some(wrapper) = self.deref(field) else { return Vec::new() };
        let Some(entries) = wrapper
            .as_dictionary()
            .and_then(|d| d.get("NS.objects"))
            .and_then(|v| v.as_array())
        else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| self.deref(entry))
            .filter_map(|layer| {
                layer
                    .as_dictionary()
                    .and_then(|d| d.get("UUID"))
                    .and_then(|u| self.resolve_string(u))
            })
            .collect()
    }

    /// Collects every `$objects` string that is, in its entirety, UUID-shaped
    /// (matching `procreate_drawing.py`'s `re.fullmatch` — a string that merely
    /// *contains* a UUID-shaped substring, such as a file path, does not count).
    pub fn all_uuids(&self) -> Vec<String> {
        self.objects
            .iter()
            .filter_map(|v| v.as_string())
            .filter(|s| UUID_PATTERN.is_match(s))
            .map(|s| s.to_string())
            .collect()
    }

    /// Checks that every UUID in the object graph appears as a substring of at
    /// least one entry in `file_names`. Returns the missing UUIDs, if any.
    pub fn validate<'a, I: IntoIterator<Item = &'a str>>(&self, file_names: I) -> Vec<String> {
        let names: Vec<&str> = file_names.into_iter().collect();
        self.all_uuids()
            .into_iter()
            .filter(|uuid| !names.iter().any(|name| name.contains(uuid.as_str())))
            .collect()
    }
}

fn parse_size(s: &str) -> Option<(u32, u32)> {
    let trimmed = s.trim().trim_start_matches('{').trim_end_matches('}');
    let (w, h) = trimmed.split_once(',')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}
