#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::types::*;

    const VM_ID: &str =
        "/subscriptions/S/resourceGroups/Default/providers/Microsoft.Compute/virtualMachines/vm1";

    #[test]
    fn global_id_is_lowercased() {
        let id = ResourceId::new(VM_ID);
        assert_eq!(id.global_id(), VM_ID.to_lowercase());
    }

    #[test]
    fn ids_compare_case_insensitively() {
        let a = ResourceId::new(VM_ID);
        let b = ResourceId::new(VM_ID.to_uppercase());
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn id_parts() {
        let id = ResourceId::new(VM_ID);
        assert_eq!(id.subscription_id(), Some("S"));
        assert_eq!(id.resource_group().as_deref(), Some("default"));
        assert_eq!(id.provider_namespace(), Some("Microsoft.Compute"));
        assert_eq!(
            id.resource_type().as_deref(),
            Some("Microsoft.Compute/virtualMachines")
        );
        assert_eq!(id.name(), "vm1");
    }

    #[test]
    fn id_without_resource_group() {
        let id = ResourceId::new("/subscriptions/S/providers/Microsoft.Network");
        assert_eq!(id.resource_group(), None);
    }

    #[test]
    fn provisioning_state_mapping() {
        use ResourceStatus::*;
        assert_eq!(ResourceStatus::from_provisioning_state("Deleting"), Deleting);
        assert_eq!(ResourceStatus::from_provisioning_state("Failed"), CreateFailed);
        assert_eq!(ResourceStatus::from_provisioning_state("Succeeded"), Available);
        assert_eq!(ResourceStatus::from_provisioning_state("Updating"), Available);
        assert_eq!(ResourceStatus::from_provisioning_state("Whatever"), Unknown);
        assert_eq!(CreateFailed.to_string(), "CREATE_FAILED");
    }

    #[test]
    fn acl_parse() {
        assert_eq!("private".parse::<BucketAcl>().unwrap(), BucketAcl::Private);
        assert_eq!("public-read".parse::<BucketAcl>().unwrap(), BucketAcl::PublicRead);
        assert!("public-read-write".parse::<BucketAcl>().is_err());
    }

    #[test]
    fn header_keys_are_canonicalized() {
        assert_eq!(canonical_header_key("x-custom"), "X-Custom");
        assert_eq!(canonical_header_key("CONTENT-MD5"), "Content-Md5");

        let mut h = ObjectHeaders::new();
        h.insert("cache-control", "no-cache");
        assert_eq!(h.get("Cache-Control"), Some("no-cache"));
    }

    #[test]
    fn headers_split_into_properties_and_metadata() {
        let h: ObjectHeaders = [
            ("Cache-Control", "no-cache"),
            ("Content-Type", "text/plain"),
            ("X-Custom", "42"),
            ("X-Empty", ""),
        ]
        .into_iter()
        .collect();

        let (props, meta) = h.split();
        assert_eq!(props.len(), 2);
        assert_eq!(meta.get("X-Custom"), Some("42"));
        assert_eq!(meta.get("X-Empty"), None);
    }

    #[test]
    fn object_key_parsing() {
        let k = ObjectKey::parse("c/dir/k").unwrap();
        assert_eq!(k.container, "c");
        assert_eq!(k.blob, "dir/k");

        assert!(ObjectKey::parse("c/").unwrap().is_container());
        assert!(ObjectKey::parse("/k").is_err());
        assert!(ObjectKey::parse("nokey").is_err());
        assert!(ObjectKey::parse_blob("c/").is_err());
    }

    #[test]
    fn byte_range_is_inclusive() {
        let r: ByteRange = "0-99".parse().unwrap();
        assert_eq!(r.len(), 100);
        assert_eq!(r.header_value(), "bytes=0-99");
        assert!("9-1".parse::<ByteRange>().is_err());
    }
}
