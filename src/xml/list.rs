//! `ListBucketResult` handlers

use super::{
    parse_bool, parse_number, parse_timestamp, DecodeError, HandlerStack, HandlerTable, ResponseDecoder,
    TagHandler,
};
use crate::config::ParseOptions;
use crate::s3::types::{unquote_etag, ObjectListing, ObjectSummary, Owner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTag {
    ListBucketResult,
    Name,
    Prefix,
    Marker,
    NextMarker,
    Delimiter,
    MaxKeys,
    IsTruncated,
    Contents,
    Key,
    ETag,
    Size,
    LastModified,
    StorageClass,
    Owner,
    Id,
    DisplayName,
    CommonPrefixes,
    Unknown,
}

/// Every string-valued handler appends, so text split across several
/// events (entity boundaries, CDATA) is kept whole.
impl TagHandler for ListTag {
    type Context = ObjectListing;

    fn on_start(self, ctx: &mut ObjectListing) -> Result<(), DecodeError> {
        match self {
            ListTag::Contents => {
                let summary = ObjectSummary::new(ctx.bucket_name.clone());
                ctx.object_summaries.push(summary);
            }
            ListTag::CommonPrefixes => ctx.common_prefixes.push(String::new()),
            ListTag::Owner => {
                current_summary(ctx, "Owner")?.owner = Some(Owner::default());
            }
            _ => {}
        }
        Ok(())
    }

    fn on_text(self, ctx: &mut ObjectListing, text: &str, stack: &HandlerStack<Self>) -> Result<(), DecodeError> {
        match self {
            ListTag::Name => ctx.bucket_name.push_str(text),
            ListTag::Prefix => {
                if stack.top_minus_one() == Some(ListTag::CommonPrefixes) {
                    if let Some(prefix) = ctx.common_prefixes.last_mut() {
                        prefix.push_str(text);
                    }
                } else {
                    ctx.prefix.get_or_insert_with(String::new).push_str(text);
                }
            }
            ListTag::Marker => ctx.marker.get_or_insert_with(String::new).push_str(text),
            ListTag::NextMarker => ctx.next_marker.get_or_insert_with(String::new).push_str(text),
            ListTag::Delimiter => ctx.delimiter.get_or_insert_with(String::new).push_str(text),
            ListTag::MaxKeys => ctx.max_keys = Some(parse_number("MaxKeys", text)?),
            ListTag::IsTruncated => ctx.truncated = parse_bool("IsTruncated", text)?,
            ListTag::Key => current_summary(ctx, "Key")?.key.push_str(text),
            ListTag::ETag => {
                current_summary(ctx, "ETag")?.etag = Some(unquote_etag(text).to_string());
            }
            ListTag::Size => current_summary(ctx, "Size")?.size = parse_number("Size", text)?,
            ListTag::LastModified => {
                current_summary(ctx, "LastModified")?.last_modified = Some(parse_timestamp(text)?);
            }
            ListTag::StorageClass => {
                current_summary(ctx, "StorageClass")?
                    .storage_class
                    .get_or_insert_with(String::new)
                    .push_str(text);
            }
            ListTag::Id => {
                if stack.top_minus_one() == Some(ListTag::Owner) {
                    current_owner(ctx)?.id.push_str(text);
                }
            }
            ListTag::DisplayName => {
                if stack.top_minus_one() == Some(ListTag::Owner) {
                    current_owner(ctx)?.display_name.push_str(text);
                }
            }
            ListTag::ListBucketResult | ListTag::Contents | ListTag::Owner | ListTag::CommonPrefixes => {}
            ListTag::Unknown => {}
        }
        Ok(())
    }

    /// On `</ListBucketResult>` the next marker becomes the greatest entry
    /// seen on the page: the last key, the last common prefix or the
    /// document's own `<NextMarker>`. Listing order is lexicographic, so
    /// resuming from it neither skips nor repeats entries.
    fn on_end(self, ctx: &mut ObjectListing) -> Result<(), DecodeError> {
        if self == ListTag::ListBucketResult {
            let last_key = ctx.object_summaries.last().map(|summary| summary.key.as_str());
            let last_prefix = ctx.common_prefixes.last().map(String::as_str);
            let next = [ctx.next_marker.as_deref(), last_key, last_prefix]
                .into_iter()
                .flatten()
                .max()
                .map(str::to_owned);
            ctx.next_marker = next;
        }
        Ok(())
    }
}

fn current_summary<'a>(ctx: &'a mut ObjectListing, tag: &'static str) -> Result<&'a mut ObjectSummary, DecodeError> {
    ctx.object_summaries
        .last_mut()
        .ok_or_else(|| DecodeError::Malformed(format!("<{}> outside <Contents>", tag)))
}

fn current_owner(ctx: &mut ObjectListing) -> Result<&mut Owner, DecodeError> {
    Ok(current_summary(ctx, "Owner")?.owner.get_or_insert_with(Owner::default))
}

/// Handler table for listings. Fields switched off in `options` are routed
/// to the unknown handler and never materialized.
pub fn list_handlers(options: ParseOptions) -> HandlerTable<ListTag> {
    let mut table = HandlerTable::new(ListTag::Unknown)
        .with("ListBucketResult", ListTag::ListBucketResult)
        .with("Name", ListTag::Name)
        .with("Prefix", ListTag::Prefix)
        .with("Marker", ListTag::Marker)
        .with("NextMarker", ListTag::NextMarker)
        .with("Delimiter", ListTag::Delimiter)
        .with("MaxKeys", ListTag::MaxKeys)
        .with("IsTruncated", ListTag::IsTruncated)
        .with("Contents", ListTag::Contents)
        .with("Key", ListTag::Key)
        .with("Size", ListTag::Size)
        .with("CommonPrefixes", ListTag::CommonPrefixes);

    if !options.skip_etag {
        table = table.with("ETag", ListTag::ETag);
    }
    if !options.skip_last_modified {
        table = table.with("LastModified", ListTag::LastModified);
    }
    if !options.skip_storage_class {
        table = table.with("StorageClass", ListTag::StorageClass);
    }
    if !options.skip_owner {
        table = table
            .with("Owner", ListTag::Owner)
            .with("ID", ListTag::Id)
            .with("DisplayName", ListTag::DisplayName);
    }
    table
}

/// Decodes `ListBucketResult` documents into [`ObjectListing`]s
#[derive(Debug, Clone)]
pub struct ListingDecoder {
    decoder: ResponseDecoder<ListTag>,
}

impl ListingDecoder {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            decoder: ResponseDecoder::new(list_handlers(options)),
        }
    }

    pub fn decode(&self, body: &[u8]) -> Result<ObjectListing, DecodeError> {
        let mut listing = ObjectListing::new();
        self.decoder.decode(body, &mut listing)?;
        if !listing.truncated {
            listing.next_marker = None;
        }
        Ok(listing)
    }
}

impl Default for ListingDecoder {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}
