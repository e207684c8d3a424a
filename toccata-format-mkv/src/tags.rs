// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tag parsing and the fixed tag-name to metadata mapping.

use toccata_core::errors::Result;
use toccata_core::io::MediaSourceStream;
use toccata_core::meta::{MetaKind, MetaStore};

use crate::element_ids::ElementType;
use crate::parser::{EbmlParser, ElementHeader};
use crate::segment::MatroskaSegment;

/// What a tag applies to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TagScope {
    /// The whole segment.
    #[default]
    Global,
    Track(u64),
    Edition(u64),
    Chapter(u64),
    Attachment(u64),
}

/// A SimpleTag: a named value with optional nested sub-tags.
#[derive(Debug, Default)]
pub struct SimpleTagData {
    pub name: String,
    pub value: Option<String>,
    pub lang: Option<String>,
    pub default: bool,
    pub sub_tags: Vec<SimpleTagData>,
}

/// One Tag element: a target plus its simple tags.
#[derive(Debug, Default)]
pub struct TagData {
    /// The TargetTypeValue. Defaults to 50 (album/movie level).
    pub target_type: u64,
    pub scope: TagScope,
    pub simple_tags: Vec<SimpleTagData>,
}

/// The fixed tag-name to metadata mapping: (kind, tag name, target type filter). A filter of 0
/// matches any target type; the first matching row wins.
const METADATA_MAP: &[(MetaKind, &str, u64)] = &[
    (MetaKind::Album, "TITLE", 50),
    (MetaKind::Title, "TITLE", 0),
    (MetaKind::Artist, "ARTIST", 0),
    (MetaKind::Genre, "GENRE", 0),
    (MetaKind::Copyright, "COPYRIGHT", 0),
    (MetaKind::TrackNumber, "PART_NUMBER", 0),
    (MetaKind::Description, "DESCRIPTION", 0),
    (MetaKind::Description, "COMMENT", 0),
    (MetaKind::Rating, "RATING", 0),
    (MetaKind::Date, "DATE_RELEASED", 0),
    (MetaKind::Date, "DATE_RELEASE", 0),
    (MetaKind::Date, "DATE_RECORDED", 0),
    (MetaKind::Url, "URL", 0),
    (MetaKind::Publisher, "PUBLISHER", 0),
    (MetaKind::EncodedBy, "ENCODED_BY", 0),
    (MetaKind::TrackTotal, "TOTAL_PARTS", 0),
];

/// Publish one tag value to the metadata store through the fixed map. Unmatched names are kept
/// as extra metadata under the raw name.
fn apply_metadata(meta: &mut MetaStore, name: &str, value: &str, target_type: u64) {
    for &(kind, key, filter) in METADATA_MAP {
        if name == key && (filter == 0 || filter == target_type) {
            meta.set(kind, value);
            log::debug!("|   |   + meta {}: {}", name, value);
            return;
        }
    }
    log::debug!("|   |   + meta (extra) {}: {}", name, value);
    meta.add_extra(name, value);
}

/// Parse one SimpleTag, recursing into nested SimpleTags. Returns `None` for a tag without both
/// a name and a value.
fn parse_simple_tag(
    io: &mut MediaSourceStream,
    meta: &mut MetaStore,
    header: ElementHeader,
    target_type: u64,
) -> Result<Option<SimpleTagData>> {
    let mut tag = SimpleTagData::default();

    log::debug!("|   + simple tag");
    let mut it = EbmlParser::of(header);
    while let Some(el) = it.get(io)? {
        match el.etype {
            ElementType::TagName => tag.name = el.read_string(io)?,
            ElementType::TagString => tag.value = Some(el.read_string(io)?),
            ElementType::TagLanguage => tag.lang = Some(el.read_string(io)?),
            ElementType::TagDefault => tag.default = el.read_uint(io)? != 0,
            // Tags can be nested.
            ElementType::SimpleTag => {
                if let Some(sub) = parse_simple_tag(io, meta, el, target_type)? {
                    tag.sub_tags.push(sub);
                }
            }
            // TODO: handle binary tag values.
            ElementType::TagBinary => (),
            other => log::debug!("|   |   + simple tag unknown ({:?})", other),
        }
    }

    let value = match (&tag.name, &tag.value) {
        (name, Some(value)) if !name.is_empty() => value.clone(),
        _ => {
            log::warn!("invalid MKV SimpleTag found");
            return Ok(None);
        }
    };

    apply_metadata(meta, &tag.name, &value, target_type);
    Ok(Some(tag))
}

impl MatroskaSegment {
    /// Load a Tags element: every Tag's target and its (possibly nested) SimpleTags, publishing
    /// mapped values to the segment's metadata.
    pub(crate) fn load_tags(&mut self, header: ElementHeader) -> Result<()> {
        let mut it = EbmlParser::of(header);
        while let Some(el) = it.get(&mut self.io)? {
            match el.etype {
                ElementType::Tag => {
                    log::debug!("+ tag");
                    let mut tag = TagData { target_type: 50, ..Default::default() };

                    let mut inner = EbmlParser::of(el);
                    while let Some(child) = inner.get(&mut self.io)? {
                        match child.etype {
                            ElementType::Targets => {
                                log::debug!("|   + targets");
                                let mut targets = EbmlParser::of(child);
                                while let Some(field) = targets.get(&mut self.io)? {
                                    match field.etype {
                                        ElementType::TargetTypeValue => {
                                            tag.target_type = field.read_uint(&mut self.io)?;
                                        }
                                        ElementType::TargetType => {
                                            let _ = field.read_string(&mut self.io)?;
                                        }
                                        ElementType::TagTrackUid => {
                                            tag.scope =
                                                TagScope::Track(field.read_uint(&mut self.io)?);
                                        }
                                        ElementType::TagEditionUid => {
                                            tag.scope =
                                                TagScope::Edition(field.read_uint(&mut self.io)?);
                                        }
                                        ElementType::TagChapterUid => {
                                            tag.scope =
                                                TagScope::Chapter(field.read_uint(&mut self.io)?);
                                        }
                                        ElementType::TagAttachmentUid => {
                                            tag.scope = TagScope::Attachment(
                                                field.read_uint(&mut self.io)?,
                                            );
                                        }
                                        other => {
                                            log::debug!("|   |   + target unknown ({:?})", other);
                                        }
                                    }
                                }
                            }
                            ElementType::SimpleTag => {
                                if let Some(simple) = parse_simple_tag(
                                    &mut self.io,
                                    &mut self.meta,
                                    child,
                                    tag.target_type,
                                )? {
                                    tag.simple_tags.push(simple);
                                }
                            }
                            other => log::debug!("|   + tag unknown ({:?})", other),
                        }
                    }

                    self.tags.push(tag);
                }
                ElementType::Void | ElementType::Crc32 => (),
                other => log::debug!("+ tags unknown ({:?})", other),
            }
        }

        log::debug!("loading tags done");
        Ok(())
    }
}
