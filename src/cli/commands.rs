use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use super::parse_s3_path;
use crate::s3::{
    DeleteObjectsResult, ListObjectsRequest, ObjectListing, ObjectMetadata, S3Client, MAX_DELETE_KEYS,
};

/// Format a size in mc-compatible compact form (0B, 1.0KiB, 10MiB, etc.)
pub fn format_bytes_compact(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes == 0 {
        return "0B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{}B", bytes)
    } else if value >= 10.0 {
        format!("{:.0}{}", value, UNITS[exponent])
    } else {
        format!("{:.1}{}", value, UNITS[exponent])
    }
}

/// `YYYY-MM-DD HH:MM:SS UTC`, or a blank placeholder of the same width
pub fn format_date(date: Option<&DateTime<Utc>>) -> String {
    match date {
        Some(date) => date.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => " ".repeat(23),
    }
}

/// List objects page by page, printing as each page arrives
pub async fn cmd_ls(client: &S3Client, path: &str, recursive: bool, max_keys: Option<u32>) -> Result<()> {
    let (bucket, prefix) = parse_s3_path(path)?;

    let mut request = ListObjectsRequest::new(&bucket);
    if let Some(prefix) = prefix {
        request = request.with_prefix(prefix);
    }
    if !recursive {
        request = request.with_delimiter("/");
    }
    if let Some(max_keys) = max_keys {
        request = request.with_max_keys(max_keys);
    }

    let mut out = std::io::BufWriter::with_capacity(64 * 1024, std::io::stdout());
    let mut listing = client.list_objects(&request).await?;
    let mut printed = 0usize;
    let mut pages = 1usize;

    loop {
        printed += write_listing(&mut out, &listing)?;
        if !listing.truncated {
            break;
        }
        out.flush()?;
        listing = client.list_next_batch(&listing).await?;
        pages += 1;
    }
    out.flush()?;

    debug!(bucket = %bucket, pages, entries = printed, "Listing complete");
    if printed == 0 {
        println!("No objects found");
    }
    Ok(())
}

fn write_listing(out: &mut impl Write, listing: &ObjectListing) -> Result<usize> {
    for prefix in &listing.common_prefixes {
        writeln!(out, "[{}] {:>7} {}", format_date(None), "PRE", prefix)?;
    }
    for summary in &listing.object_summaries {
        writeln!(
            out,
            "[{}] {:>7} {}",
            format_date(summary.last_modified.as_ref()),
            format_bytes_compact(summary.size),
            summary.key
        )?;
    }
    Ok(listing.common_prefixes.len() + listing.object_summaries.len())
}

/// Download an object to a file or stdout
pub async fn cmd_get(client: &S3Client, path: &str, output: Option<&Path>) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.context("Object key is required for get")?;

    let object = client.get_object(&bucket, &key).await?;

    match output {
        Some(file) => {
            tokio::fs::write(file, &object.content)
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            eprintln!(
                "s3://{}/{} -> {} ({})",
                bucket,
                key,
                file.display(),
                format_bytes_compact(object.length)
            );
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&object.content)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Upload a local file
pub async fn cmd_put(client: &S3Client, file: &Path, path: &str, content_type: Option<String>) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.context("Object key is required for put")?;

    let body = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let size = body.len() as u64;

    let mut metadata = ObjectMetadata::default();
    if let Some(content_type) = content_type {
        metadata = metadata.with_content_type(content_type);
    }

    let response = client.put_object(&bucket, &key, body, metadata).await?;
    println!("{} -> s3://{}/{} ({})", file.display(), bucket, key, format_bytes_compact(size));
    if let Some(etag) = response.etag {
        println!("ETag: {}", etag);
    }
    Ok(())
}

/// Delete objects. A single key uses a plain DELETE; several keys of one
/// bucket are sent as bulk deletes of up to 1000 keys each.
pub async fn cmd_rm(client: &S3Client, paths: &[String], recursive: bool) -> Result<()> {
    let mut failed = 0usize;

    for (bucket, keys) in group_by_bucket(paths)? {
        if recursive {
            for prefix in &keys {
                failed += remove_prefix(client, &bucket, prefix).await?;
            }
        } else if let [key] = keys.as_slice() {
            client.delete_object(&bucket, key).await?;
            println!("Deleted: s3://{}/{}", bucket, key);
        } else {
            failed += remove_keys(client, &bucket, &keys).await?;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} object(s) could not be deleted", failed);
    }
    Ok(())
}

/// Bulk delete every object under `prefix`, one page at a time
async fn remove_prefix(client: &S3Client, bucket: &str, prefix: &str) -> Result<usize> {
    let request = ListObjectsRequest::new(bucket)
        .with_prefix(prefix)
        .with_max_keys(MAX_DELETE_KEYS as u32);

    let mut listing = client.list_objects(&request).await?;
    let mut deleted = 0usize;
    let mut failed = 0usize;

    loop {
        if !listing.object_summaries.is_empty() {
            let keys: Vec<&str> = listing.object_summaries.iter().map(|o| o.key.as_str()).collect();
            let result = client.delete_objects(bucket, &keys).await?;
            deleted += result.deleted.len();
            failed += report(bucket, &result);
        }
        if !listing.truncated {
            break;
        }
        listing = client.list_next_batch(&listing).await?;
    }

    info!(bucket, prefix, deleted, failed, "Prefix removed");
    println!("Total deleted: {} objects", deleted);
    Ok(failed)
}

/// Bulk delete explicit keys, all batches in flight at once
async fn remove_keys(client: &S3Client, bucket: &str, keys: &[String]) -> Result<usize> {
    let batches = keys
        .chunks(MAX_DELETE_KEYS)
        .map(|batch| client.delete_objects(bucket, batch));

    let mut failed = 0usize;
    for result in join_all(batches).await {
        failed += report(bucket, &result?);
    }
    Ok(failed)
}

fn report(bucket: &str, result: &DeleteObjectsResult) -> usize {
    for deleted in &result.deleted {
        println!("Deleted: s3://{}/{}", bucket, deleted.key);
    }
    for error in &result.errors {
        eprintln!("Error deleting {}: {} - {}", error.key, error.code, error.message);
    }
    result.errors.len()
}

/// Group paths by bucket, keeping first-seen order
fn group_by_bucket(paths: &[String]) -> Result<Vec<(String, Vec<String>)>> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for path in paths {
        let (bucket, key) = parse_s3_path(path)?;
        let key = key.with_context(|| format!("Object key is required: {}", path))?;
        match groups.iter_mut().find(|(b, _)| *b == bucket) {
            Some((_, keys)) => keys.push(key),
            None => groups.push((bucket, vec![key])),
        }
    }
    Ok(groups)
}

/// Show object information from its listing entry
pub async fn cmd_stat(client: &S3Client, path: &str) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.context("Object key is required for stat")?;

    let request = ListObjectsRequest::new(&bucket).with_prefix(&key).with_max_keys(1);
    let listing = client.list_objects(&request).await?;

    let object = listing
        .object_summaries
        .iter()
        .find(|o| o.key == key)
        .with_context(|| format!("Object not found: {}", key))?;

    println!("Object: s3://{}/{}", bucket, object.key);
    println!("Size: {} ({})", format_bytes_compact(object.size), object.size);
    println!("Last Modified: {}", format_date(object.last_modified.as_ref()).trim());
    if let Some(etag) = &object.etag {
        println!("ETag: {}", etag);
    }
    if let Some(storage_class) = &object.storage_class {
        println!("Storage Class: {}", storage_class);
    }
    if let Some(owner) = &object.owner {
        println!("Owner: {} ({})", owner.display_name, owner.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_bytes_compact() {
        assert_eq!(format_bytes_compact(0), "0B");
        assert_eq!(format_bytes_compact(512), "512B");
        assert_eq!(format_bytes_compact(1536), "1.5KiB");
        assert_eq!(format_bytes_compact(20 * 1024 * 1024), "20MiB");
    }

    #[test]
    fn test_format_date() {
        let date = Utc.with_ymd_and_hms(2014, 1, 22, 20, 44, 33).unwrap();
        assert_eq!(format_date(Some(&date)), "2014-01-22 20:44:33 UTC");
        assert_eq!(format_date(None).len(), 23);
    }

    #[test]
    fn test_group_by_bucket() {
        let paths = vec![
            "s3://a/k1".to_string(),
            "s3://b/k2".to_string(),
            "s3://a/k3".to_string(),
        ];
        let groups = group_by_bucket(&paths).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], ("a".to_string(), vec!["k1".to_string(), "k3".to_string()]));
        assert_eq!(groups[1].0, "b");

        assert!(group_by_bucket(&["s3://a".to_string()]).is_err());
    }

    #[test]
    fn test_write_listing() {
        let listing = ObjectListing {
            common_prefixes: vec!["dir/".to_string()],
            object_summaries: vec![crate::s3::ObjectSummary {
                key: "file.txt".to_string(),
                size: 2048,
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut out = Vec::new();
        assert_eq!(write_listing(&mut out, &listing).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("PRE dir/"));
        assert!(text.contains("2.0KiB file.txt"));
    }
}
