use azmux_arm::Region;
use azmux_facade::{Bucket, CloudResource, ListObjectsResult};
use serde_json::{json, Value};

/// One line per region: short name, display name, global id.
pub fn render_regions(regions: &[Region]) -> String {
    if regions.is_empty() {
        return "No regions.\n".to_string();
    }
    let mut out = String::new();
    for r in regions {
        out.push_str(&format!("{:<24} {:<32} {}\n", r.id, r.display_name, r.global_id));
    }
    out
}

/// Any resource as `status  global-id`.
pub fn render_resources<R: CloudResource>(resources: &[R]) -> String {
    if resources.is_empty() {
        return "No resources.\n".to_string();
    }
    let mut out = String::new();
    for r in resources {
        out.push_str(&format!("{:<14} {}\n", r.status().to_string(), r.global_id()));
    }
    out
}

pub fn render_buckets(buckets: &[Bucket]) -> String {
    if buckets.is_empty() {
        return "No buckets.\n".to_string();
    }
    let mut out = String::new();
    for b in buckets {
        out.push_str(&format!(
            "{:<24} {:<16} {:<16} {}\n",
            b.name(),
            b.location(),
            b.storage_class(),
            b.status()
        ));
    }
    out
}

pub fn buckets_json(buckets: &[Bucket]) -> Value {
    buckets
        .iter()
        .map(|b| {
            json!({
                "id":            b.global_id(),
                "name":          b.name(),
                "location":      b.location(),
                "storage_class": b.storage_class(),
                "status":        b.status(),
                "project_id":    b.project_id(),
                "access_urls":   b.access_urls(),
            })
        })
        .collect()
}

/// Prefixes first, then objects with size and modification time.
pub fn render_objects(listing: &ListObjectsResult) -> String {
    let mut out = String::new();
    for p in &listing.common_prefixes {
        out.push_str(&format!("{:>12} {:<20} {}\n", "PRE", "", p.key));
    }
    for o in &listing.objects {
        let modified = o
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        out.push_str(&format!("{:>12} {:<20} {}\n", o.size_bytes, modified, o.key));
    }
    if let Some(marker) = &listing.next_marker {
        out.push_str(&format!("(truncated, continue with --marker {})\n", marker));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use azmux_facade::CloudObject;

    #[test]
    fn objects_listing_shows_prefixes_and_marker() {
        let listing = ListObjectsResult {
            objects: vec![CloudObject { key: "a/x".into(), size_bytes: 42, ..Default::default() }],
            common_prefixes: vec![CloudObject { key: "b/".into(), ..Default::default() }],
            next_marker: Some("a/m2".into()),
            is_truncated: true,
        };
        let text = render_objects(&listing);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("PRE") && lines[0].ends_with("b/"));
        assert!(lines[1].trim_start().starts_with("42") && lines[1].ends_with("a/x"));
        assert!(lines[2].contains("--marker a/m2"));
    }

    #[test]
    fn empty_regions() {
        assert_eq!(render_regions(&[]), "No regions.\n");
    }
}
