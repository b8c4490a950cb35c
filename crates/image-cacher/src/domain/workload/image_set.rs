use std::fmt;

use tracing::warn;

use super::builder::IDLE_CONTAINER_NAME;

/// Longest name Kubernetes accepts for a label-like object or container name.
pub const MAX_LABEL_LEN: usize = 63;

/// Whether `name` is a lowercase RFC 1123 label, the format Kubernetes
/// requires for container and namespace names.
pub fn is_dns1123_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_LABEL_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// A single `name=image` entry of the image set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Logical name, used as the init container name.
    pub name: String,
    /// Image reference to pull.
    pub image: String,
}

/// Ordered, name-unique set of images to pre-pull on every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    entries: Vec<ImageEntry>,
}

impl ImageSet {
    /// Parses a `name=image;name=image;...` string.
    ///
    /// Whitespace around entries is ignored and empty entries (including a
    /// trailing separator) are skipped. Entries that do not split into exactly
    /// one non-empty name and one non-empty image around a single `=` are
    /// dropped with a warning, as are repeated names after their first
    /// occurrence. Names become init container names, so names that are not
    /// RFC 1123 labels and the idle container's name are dropped as well.
    /// Parsing never fails; callers decide whether an empty set is acceptable.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::default();

        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split('=').collect();
            let [name, image] = parts.as_slice() else {
                warn!(entry, "Malformed image entry, expected <name>=<image>. Ignoring.");
                continue;
            };

            let (name, image) = (name.trim(), image.trim());
            if name.is_empty() || image.is_empty() {
                warn!(entry, "Image entry with empty name or image. Ignoring.");
                continue;
            }

            if !is_dns1123_label(name) {
                warn!(name, "Image name is not a lowercase RFC 1123 label. Ignoring.");
                continue;
            }

            if name == IDLE_CONTAINER_NAME {
                warn!(name, "Image name is reserved for the idle container. Ignoring.");
                continue;
            }

            if !set.insert(name, image) {
                warn!(name, image, "Duplicate image name, keeping the first entry");
            }
        }

        set
    }

    /// Adds an entry, returning `false` if the name is already taken.
    pub fn insert(&mut self, name: impl Into<String>, image: impl Into<String>) -> bool {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return false;
        }
        self.entries.push(ImageEntry {
            name,
            image: image.into(),
        });
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ImageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{}={}", entry.name, entry.image)?;
        }
        Ok(())
    }
}
