//! End-to-end scenarios over the service core: a temp storage root, an
//! in-memory metadata store, and the real operation handlers.

use std::sync::Arc;

use bytes::Bytes;
use md5::Digest as _;

use alarik_core::cache::CredentialCache;
use alarik_core::metadata::MetadataStore;
use alarik_s3_core::{
    AlarikS3, AuthContext, FsStore, GetOutcome, ListObjectsV2Params, PutObjectParams,
};
use alarik_s3_model::error::S3ErrorCode;
use alarik_s3_model::types::{
    CompletedMultipartUpload, CompletedPart, VersioningConfiguration,
};

struct Harness {
    _dir: tempfile::TempDir,
    s3: AlarikS3,
    auth: AuthContext,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MetadataStore::open_in_memory().expect("metadata store");
    let user = store.create_user("tester", "pw", false).expect("user");
    let cache = Arc::new(CredentialCache::new());
    let s3 = AlarikS3::new("us-east-1", FsStore::new(dir.path()), store, cache);
    Harness {
        _dir: dir,
        s3,
        auth: AuthContext {
            user_id: user.id,
            is_admin: false,
        },
    }
}

async fn make_bucket(h: &Harness, name: &str) {
    h.s3.create_bucket(&h.auth, name).await.expect("create bucket");
}

fn enable_versioning(h: &Harness, bucket: &str) {
    h.s3.put_bucket_versioning(
        &h.auth,
        bucket,
        &VersioningConfiguration {
            status: Some("Enabled".to_owned()),
        },
    )
    .expect("enable versioning");
}

async fn put(h: &Harness, bucket: &str, key: &str, data: &[u8]) -> alarik_s3_core::PutOutcome {
    h.s3.put_object(
        &h.auth,
        bucket,
        key,
        Bytes::copy_from_slice(data),
        PutObjectParams::default(),
    )
    .await
    .expect("put object")
}

async fn get_bytes(h: &Harness, bucket: &str, key: &str, version: Option<&str>) -> Bytes {
    match h
        .s3
        .get_object(&h.auth, bucket, key, version, None, true)
        .await
        .expect("get object")
    {
        GetOutcome::Found(found) => found.body.expect("body"),
        GetOutcome::DeleteMarker { .. } => panic!("unexpected delete marker"),
    }
}

// ---------------------------------------------------------------------------
// Scenario 1: basic round trip on a non-versioned bucket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_round_trip_simple_object() {
    let h = harness();
    make_bucket(&h, "b1").await;

    let outcome = put(&h, "b1", "a.txt", b"hi").await;
    assert_eq!(outcome.etag, "\"49f68a5c8493ec2c0bf489821c21fc3b\"");
    assert!(outcome.version_id.is_none(), "non-versioned PUT has no version id");

    let body = get_bytes(&h, "b1", "a.txt", None).await;
    assert_eq!(body.as_ref(), b"hi");

    // The "null" version id addresses the same object.
    let body = get_bytes(&h, "b1", "a.txt", Some("null")).await;
    assert_eq!(body.as_ref(), b"hi");
}

#[tokio::test]
async fn test_should_report_metadata_on_head() {
    let h = harness();
    make_bucket(&h, "b1").await;
    let mut params = PutObjectParams {
        content_type: Some("text/plain".to_owned()),
        ..PutObjectParams::default()
    };
    params
        .user_metadata
        .insert("camera".to_owned(), "nikon".to_owned());
    h.s3.put_object(&h.auth, "b1", "a.txt", Bytes::from_static(b"hi"), params)
        .await
        .unwrap();

    let outcome = h
        .s3
        .get_object(&h.auth, "b1", "a.txt", None, None, false)
        .await
        .unwrap();
    let GetOutcome::Found(found) = outcome else {
        panic!("expected object");
    };
    assert!(found.body.is_none());
    assert_eq!(found.record.content_type.as_deref(), Some("text/plain"));
    assert_eq!(
        found.record.user_metadata.get("camera").map(String::as_str),
        Some("nikon")
    );
    assert_eq!(found.record.size, 2);
}

#[tokio::test]
async fn test_should_return_no_such_key_for_absent_object() {
    let h = harness();
    make_bucket(&h, "b1").await;
    let err = h
        .s3
        .get_object(&h.auth, "b1", "ghost", None, None, true)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::NoSuchKey);
}

// ---------------------------------------------------------------------------
// Scenario 2: versioned overwrite, per-version reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_retain_history_across_versioned_overwrites() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");

    let v1 = put(&h, "b1", "k", b"A").await.version_id.unwrap();
    let v2 = put(&h, "b1", "k", b"B").await.version_id.unwrap();
    assert!(v1 < v2, "version ids must sort in write order");

    let listing = h
        .s3
        .list_object_versions(&h.auth, "b1", "", None, None)
        .unwrap();
    assert_eq!(listing.versions.len(), 2);
    assert!(listing.delete_markers.is_empty());
    // Newest first within the key.
    assert_eq!(listing.versions[0].version_id, v2);
    assert!(listing.versions[0].is_latest);
    assert!(!listing.versions[1].is_latest);
    assert_eq!(
        listing.versions[0].etag,
        format!("\"{}\"", "9d5ed678fe57bcca610140957afab571") // md5("B")
    );
    assert_eq!(
        listing.versions[1].etag,
        format!("\"{}\"", "7fc56270e7a70fa81a5935b72eacbe29") // md5("A")
    );

    assert_eq!(get_bytes(&h, "b1", "k", None).await.as_ref(), b"B");
    assert_eq!(get_bytes(&h, "b1", "k", Some(&v1)).await.as_ref(), b"A");
    assert_eq!(get_bytes(&h, "b1", "k", Some(&v2)).await.as_ref(), b"B");
}

#[tokio::test]
async fn test_should_order_concurrent_puts_on_same_key() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");
    let s3 = Arc::new(h.s3);
    let auth = h.auth;

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let s3 = Arc::clone(&s3);
        handles.push(tokio::spawn(async move {
            s3.put_object(
                &auth,
                "b1",
                "contended",
                Bytes::from(vec![i]),
                PutObjectParams::default(),
            )
            .await
            .expect("put")
            .version_id
            .expect("version id")
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.expect("join"));
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8, "every PUT must allocate a distinct version id");

    // Every version remains retrievable.
    for vid in &ids {
        match s3
            .get_object(&auth, "b1", "contended", Some(vid), None, true)
            .await
            .expect("get versioned")
        {
            GetOutcome::Found(found) => assert_eq!(found.body.unwrap().len(), 1),
            GetOutcome::DeleteMarker { .. } => panic!("not a marker"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario 4: delete markers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_insert_delete_marker_and_hide_key() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");

    let v1 = put(&h, "b1", "k", b"data").await.version_id.unwrap();
    let outcome = h
        .s3
        .delete_object(&h.auth, "b1", "k", None)
        .await
        .expect("delete");
    assert!(outcome.delete_marker);
    let marker_vid = outcome.version_id.expect("marker version id");
    assert_ne!(marker_vid, v1);

    // Unqualified GET resolves the marker.
    match h
        .s3
        .get_object(&h.auth, "b1", "k", None, None, true)
        .await
        .unwrap()
    {
        GetOutcome::DeleteMarker { explicit, .. } => assert!(!explicit),
        GetOutcome::Found(_) => panic!("expected marker"),
    }

    // GET by the marker's version id is the explicit (405) case.
    match h
        .s3
        .get_object(&h.auth, "b1", "k", Some(&marker_vid), None, true)
        .await
        .unwrap()
    {
        GetOutcome::DeleteMarker { explicit, .. } => assert!(explicit),
        GetOutcome::Found(_) => panic!("expected marker"),
    }

    // The prior version still serves its bytes.
    assert_eq!(get_bytes(&h, "b1", "k", Some(&v1)).await.as_ref(), b"data");

    // The marker shows up in the version listing as latest.
    let listing = h
        .s3
        .list_object_versions(&h.auth, "b1", "", None, None)
        .unwrap();
    assert_eq!(listing.delete_markers.len(), 1);
    assert!(listing.delete_markers[0].is_latest);
    assert!(!listing.versions[0].is_latest);

    // And the key is gone from the live listing.
    let live = h
        .s3
        .list_objects_v2(&h.auth, "b1", ListObjectsV2Params::default())
        .await
        .unwrap();
    assert!(live.contents.is_empty());
}

#[tokio::test]
async fn test_should_restore_key_when_marker_is_deleted() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");

    put(&h, "b1", "k", b"data").await;
    let marker_vid = h
        .s3
        .delete_object(&h.auth, "b1", "k", None)
        .await
        .unwrap()
        .version_id
        .unwrap();

    let outcome = h
        .s3
        .delete_object(&h.auth, "b1", "k", Some(&marker_vid))
        .await
        .expect("delete marker version");
    assert!(outcome.delete_marker);

    assert_eq!(get_bytes(&h, "b1", "k", None).await.as_ref(), b"data");
}

#[tokio::test]
async fn test_should_repoint_canonical_when_current_version_deleted() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");

    let v1 = put(&h, "b1", "k", b"first").await.version_id.unwrap();
    let v2 = put(&h, "b1", "k", b"second").await.version_id.unwrap();

    h.s3.delete_object(&h.auth, "b1", "k", Some(&v2))
        .await
        .expect("delete current version");

    // The prior version becomes current again.
    assert_eq!(get_bytes(&h, "b1", "k", None).await.as_ref(), b"first");
    assert_eq!(get_bytes(&h, "b1", "k", Some(&v1)).await.as_ref(), b"first");

    let err = h
        .s3
        .get_object(&h.auth, "b1", "k", Some(&v2), None, true)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::NoSuchVersion);
}

#[tokio::test]
async fn test_should_remove_file_on_unversioned_delete() {
    let h = harness();
    make_bucket(&h, "b1").await;
    put(&h, "b1", "k", b"data").await;

    let outcome = h.s3.delete_object(&h.auth, "b1", "k", None).await.unwrap();
    assert!(!outcome.delete_marker);
    assert!(outcome.version_id.is_none());

    let err = h
        .s3
        .get_object(&h.auth, "b1", "k", None, None, true)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::NoSuchKey);

    // Deleting again is idempotent.
    assert!(h.s3.delete_object(&h.auth, "b1", "k", None).await.is_ok());
}

// ---------------------------------------------------------------------------
// Suspended versioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_overwrite_null_version_when_suspended() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");
    let v1 = put(&h, "b1", "k", b"versioned").await.version_id.unwrap();

    h.s3.put_bucket_versioning(
        &h.auth,
        "b1",
        &VersioningConfiguration {
            status: Some("Suspended".to_owned()),
        },
    )
    .unwrap();

    let first = put(&h, "b1", "k", b"null-one").await;
    assert_eq!(first.version_id.as_deref(), Some("null"));
    let second = put(&h, "b1", "k", b"null-two").await;
    assert_eq!(second.version_id.as_deref(), Some("null"));

    // Exactly one "null" version plus the original versioned one.
    let listing = h
        .s3
        .list_object_versions(&h.auth, "b1", "", None, None)
        .unwrap();
    assert_eq!(listing.versions.len(), 2);
    assert_eq!(get_bytes(&h, "b1", "k", None).await.as_ref(), b"null-two");
    assert_eq!(
        get_bytes(&h, "b1", "k", Some(&v1)).await.as_ref(),
        b"versioned"
    );

    // Re-enabling keeps working.
    enable_versioning(&h, "b1");
    let v3 = put(&h, "b1", "k", b"again").await.version_id.unwrap();
    assert_ne!(v3, "null");
    assert_eq!(
        get_bytes(&h, "b1", "k", Some("null")).await.as_ref(),
        b"null-two"
    );
}

// ---------------------------------------------------------------------------
// Versioning configuration transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_reject_disabling_versioning() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");

    // The wire format cannot express "Disabled"; it parses as
    // MalformedXML.
    let err = h
        .s3
        .put_bucket_versioning(
            &h.auth,
            "b1",
            &VersioningConfiguration {
                status: Some("Disabled".to_owned()),
            },
        )
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::MalformedXML);

    let config = h.s3.get_bucket_versioning(&h.auth, "b1").unwrap();
    assert_eq!(config.status.as_deref(), Some("Enabled"));
}

#[tokio::test]
async fn test_should_report_no_status_before_first_enable() {
    let h = harness();
    make_bucket(&h, "b1").await;
    let config = h.s3.get_bucket_versioning(&h.auth, "b1").unwrap();
    assert!(config.status.is_none());
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_serve_single_byte_range() {
    let h = harness();
    make_bucket(&h, "b1").await;
    put(&h, "b1", "k", b"hello world").await;

    let outcome = h
        .s3
        .get_object(&h.auth, "b1", "k", None, Some("bytes=0-0"), true)
        .await
        .unwrap();
    let GetOutcome::Found(found) = outcome else {
        panic!("expected object");
    };
    assert_eq!(found.body.unwrap().as_ref(), b"h");
    assert_eq!(found.content_range, Some((0, 0, 11)));
}

#[tokio::test]
async fn test_should_reject_unsatisfiable_range() {
    let h = harness();
    make_bucket(&h, "b1").await;
    put(&h, "b1", "k", b"abc").await;

    let err = h
        .s3
        .get_object(&h.auth, "b1", "k", None, Some("bytes=9-12"), true)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::InvalidRange);
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_enforce_bucket_name_rules() {
    let h = harness();

    for bad in ["ab", "a-", "-ab", "UPPER", "dots.forbidden"] {
        let err = h.s3.create_bucket(&h.auth, bad).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidBucketName, "name {bad}");
    }

    let max = "a".repeat(63);
    h.s3.create_bucket(&h.auth, &max).await.expect("63 chars is valid");
}

#[tokio::test]
async fn test_should_enforce_bucket_uniqueness_and_emptiness() {
    let h = harness();
    make_bucket(&h, "b1").await;

    let err = h.s3.create_bucket(&h.auth, "b1").await.unwrap_err();
    assert_eq!(err.code, S3ErrorCode::BucketAlreadyExists);

    put(&h, "b1", "k", b"x").await;
    let err = h.s3.delete_bucket(&h.auth, "b1", false).await.unwrap_err();
    assert_eq!(err.code, S3ErrorCode::BucketNotEmpty);

    h.s3.delete_object(&h.auth, "b1", "k", None).await.unwrap();
    h.s3.delete_bucket(&h.auth, "b1", false)
        .await
        .expect("empty bucket deletes");

    let err = h.s3.head_bucket(&h.auth, "b1").unwrap_err();
    assert_eq!(err.code, S3ErrorCode::NoSuchBucket);
}

#[tokio::test]
async fn test_should_force_delete_non_empty_bucket() {
    let h = harness();
    make_bucket(&h, "b1").await;
    enable_versioning(&h, "b1");
    put(&h, "b1", "k", b"x").await;

    let admin = AuthContext {
        user_id: h.auth.user_id,
        is_admin: true,
    };
    h.s3.delete_bucket(&admin, "b1", true)
        .await
        .expect("force delete");
    assert!(h.s3.fs().bucket_dir("b1").metadata().is_err());
}

// ---------------------------------------------------------------------------
// ListObjectsV2
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_list_in_bytewise_order_with_delimiter() {
    let h = harness();
    make_bucket(&h, "b1").await;
    for key in ["zz.txt", "logs/2024/a", "logs/2024/b", "logs/2025/a", "a.txt"] {
        put(&h, "b1", key, b"x").await;
    }

    let listing = h
        .s3
        .list_objects_v2(
            &h.auth,
            "b1",
            ListObjectsV2Params {
                delimiter: Some("/".to_owned()),
                ..ListObjectsV2Params::default()
            },
        )
        .await
        .unwrap();

    let keys: Vec<&str> = listing.contents.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["a.txt", "zz.txt"]);
    let prefixes: Vec<&str> = listing
        .common_prefixes
        .iter()
        .map(|p| p.prefix.as_str())
        .collect();
    assert_eq!(prefixes, vec!["logs/"]);
    assert_eq!(listing.key_count, 3);

    // Prefix drills into the grouped subtree.
    let listing = h
        .s3
        .list_objects_v2(
            &h.auth,
            "b1",
            ListObjectsV2Params {
                prefix: "logs/".to_owned(),
                delimiter: Some("/".to_owned()),
                ..ListObjectsV2Params::default()
            },
        )
        .await
        .unwrap();
    let prefixes: Vec<&str> = listing
        .common_prefixes
        .iter()
        .map(|p| p.prefix.as_str())
        .collect();
    assert_eq!(prefixes, vec!["logs/2024/", "logs/2025/"]);
    assert!(listing.contents.is_empty());
}

#[tokio::test]
async fn test_should_paginate_with_continuation_token() {
    let h = harness();
    make_bucket(&h, "b1").await;
    for i in 0..7 {
        put(&h, "b1", &format!("key-{i}"), b"x").await;
    }

    let mut collected = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let listing = h
            .s3
            .list_objects_v2(
                &h.auth,
                "b1",
                ListObjectsV2Params {
                    max_keys: Some(3),
                    continuation_token: token.clone(),
                    ..ListObjectsV2Params::default()
                },
            )
            .await
            .unwrap();
        pages += 1;
        collected.extend(listing.contents.iter().map(|o| o.key.clone()));
        match listing.next_continuation_token {
            Some(next) => token = Some(next),
            None => break,
        }
        assert!(pages < 10, "runaway pagination");
    }

    assert_eq!(pages, 3);
    let expected: Vec<String> = (0..7).map(|i| format!("key-{i}")).collect();
    assert_eq!(collected, expected);
}

#[tokio::test]
async fn test_should_reject_forged_continuation_token() {
    let h = harness();
    make_bucket(&h, "b1").await;
    let err = h
        .s3
        .list_objects_v2(
            &h.auth,
            "b1",
            ListObjectsV2Params {
                continuation_token: Some("a2V5LTA.deadbeefdeadbeef".to_owned()),
                ..ListObjectsV2Params::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::InvalidArgument);
}

// ---------------------------------------------------------------------------
// Scenario 3 + 5: multipart
// ---------------------------------------------------------------------------

const MIB: usize = 1024 * 1024;

fn part_bytes(fill: u8, len: usize) -> Bytes {
    Bytes::from(vec![fill; len])
}

#[tokio::test]
async fn test_should_complete_multipart_upload_with_composite_etag() {
    let h = harness();
    make_bucket(&h, "b1").await;

    let init = h
        .s3
        .create_multipart_upload(&h.auth, "b1", "big", PutObjectParams::default())
        .await
        .unwrap();

    let p1 = part_bytes(0xAA, 6 * MIB);
    let p2 = part_bytes(0xBB, 6 * MIB);
    let e1 = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 1, p1.clone())
        .await
        .unwrap();
    let e2 = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 2, p2.clone())
        .await
        .unwrap();

    let request = CompletedMultipartUpload {
        parts: vec![
            CompletedPart {
                part_number: 1,
                etag: e1.clone(),
            },
            CompletedPart {
                part_number: 2,
                etag: e2.clone(),
            },
        ],
    };
    let (result, _version) = h
        .s3
        .complete_multipart_upload(&h.auth, "b1", "big", &init.upload_id, &request)
        .await
        .unwrap();

    // ETag = md5(rawmd5(P1) || rawmd5(P2)) + "-2".
    let raw1 = hex::decode(e1.trim_matches('"')).unwrap();
    let raw2 = hex::decode(e2.trim_matches('"')).unwrap();
    let mut joined = raw1;
    joined.extend_from_slice(&raw2);
    let expected = format!("\"{}-2\"", hex::encode(md5::Md5::digest(&joined)));
    assert_eq!(result.etag, expected);

    // The object is the concatenation, in the listed order.
    let body = get_bytes(&h, "b1", "big", None).await;
    assert_eq!(body.len(), 12 * MIB);
    assert_eq!(&body[..6 * MIB], p1.as_ref());
    assert_eq!(&body[6 * MIB..], p2.as_ref());

    // Staging is gone.
    assert!(
        h.s3.list_multipart_uploads(&h.auth, "b1")
            .unwrap()
            .uploads
            .is_empty()
    );
    assert!(!h.s3.fs().multipart_dir("b1", &init.upload_id).exists());
}

#[tokio::test]
async fn test_should_reject_small_non_final_part_at_complete() {
    let h = harness();
    make_bucket(&h, "b1").await;

    let init = h
        .s3
        .create_multipart_upload(&h.auth, "b1", "big", PutObjectParams::default())
        .await
        .unwrap();

    // Part 1 of 3 MiB in a multi-part upload: allowed at upload time,
    // rejected at Complete.
    let e1 = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 1, part_bytes(1, 3 * MIB))
        .await
        .unwrap();
    let e2 = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 2, part_bytes(2, 6 * MIB))
        .await
        .unwrap();
    let e3 = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 3, part_bytes(3, 1024))
        .await
        .unwrap();

    let request = CompletedMultipartUpload {
        parts: vec![
            CompletedPart {
                part_number: 1,
                etag: e1,
            },
            CompletedPart {
                part_number: 2,
                etag: e2,
            },
            CompletedPart {
                part_number: 3,
                etag: e3,
            },
        ],
    };
    let err = h
        .s3
        .complete_multipart_upload(&h.auth, "b1", "big", &init.upload_id, &request)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::EntityTooSmall);

    // The upload stays OPEN for a retry.
    let open = h.s3.list_multipart_uploads(&h.auth, "b1").unwrap();
    assert!(open.uploads.iter().any(|u| u.upload_id == init.upload_id));
}

#[tokio::test]
async fn test_should_reject_misordered_and_mismatched_parts() {
    let h = harness();
    make_bucket(&h, "b1").await;

    let init = h
        .s3
        .create_multipart_upload(&h.auth, "b1", "big", PutObjectParams::default())
        .await
        .unwrap();
    let e1 = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 1, part_bytes(1, 6 * MIB))
        .await
        .unwrap();
    let e2 = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 2, part_bytes(2, 6 * MIB))
        .await
        .unwrap();

    // Descending order.
    let request = CompletedMultipartUpload {
        parts: vec![
            CompletedPart {
                part_number: 2,
                etag: e2.clone(),
            },
            CompletedPart {
                part_number: 1,
                etag: e1,
            },
        ],
    };
    let err = h
        .s3
        .complete_multipart_upload(&h.auth, "b1", "big", &init.upload_id, &request)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::InvalidPartOrder);

    // Wrong ETag.
    let request = CompletedMultipartUpload {
        parts: vec![CompletedPart {
            part_number: 2,
            etag: "\"0123456789abcdef0123456789abcdef\"".to_owned(),
        }],
    };
    let err = h
        .s3
        .complete_multipart_upload(&h.auth, "b1", "big", &init.upload_id, &request)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::InvalidPart);

    // Unknown part number.
    let request = CompletedMultipartUpload {
        parts: vec![CompletedPart {
            part_number: 7,
            etag: e2,
        }],
    };
    let err = h
        .s3
        .complete_multipart_upload(&h.auth, "b1", "big", &init.upload_id, &request)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::InvalidPart);
}

#[tokio::test]
async fn test_should_abort_upload_and_clean_staging() {
    let h = harness();
    make_bucket(&h, "b1").await;

    let init = h
        .s3
        .create_multipart_upload(&h.auth, "b1", "big", PutObjectParams::default())
        .await
        .unwrap();
    h.s3.upload_part(&h.auth, "b1", &init.upload_id, 1, part_bytes(9, 1024))
        .await
        .unwrap();

    h.s3.abort_multipart_upload(&h.auth, "b1", &init.upload_id)
        .await
        .expect("abort");

    assert!(
        h.s3.list_multipart_uploads(&h.auth, "b1")
            .unwrap()
            .uploads
            .is_empty()
    );
    assert!(!h.s3.fs().multipart_dir("b1", &init.upload_id).exists());

    let err = h
        .s3
        .abort_multipart_upload(&h.auth, "b1", &init.upload_id)
        .await
        .unwrap_err();
    assert_eq!(err.code, S3ErrorCode::NoSuchUpload);
}

#[tokio::test]
async fn test_should_replace_part_and_honor_replacement_at_complete() {
    let h = harness();
    make_bucket(&h, "b1").await;

    let init = h
        .s3
        .create_multipart_upload(&h.auth, "b1", "obj", PutObjectParams::default())
        .await
        .unwrap();
    let _old = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 1, part_bytes(1, 1024))
        .await
        .unwrap();
    let replacement = part_bytes(2, 2048);
    let new = h
        .s3
        .upload_part(&h.auth, "b1", &init.upload_id, 1, replacement.clone())
        .await
        .unwrap();

    let request = CompletedMultipartUpload {
        parts: vec![CompletedPart {
            part_number: 1,
            etag: new,
        }],
    };
    h.s3.complete_multipart_upload(&h.auth, "b1", "obj", &init.upload_id, &request)
        .await
        .expect("single-part complete");

    let body = get_bytes(&h, "b1", "obj", None).await;
    assert_eq!(body, replacement);
}

// ---------------------------------------------------------------------------
// Copy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_copy_object_across_buckets() {
    let h = harness();
    make_bucket(&h, "src").await;
    make_bucket(&h, "dst").await;

    let params = PutObjectParams {
        content_type: Some("text/plain".to_owned()),
        ..PutObjectParams::default()
    };
    h.s3.put_object(&h.auth, "src", "a", Bytes::from_static(b"payload"), params)
        .await
        .unwrap();

    let (result, _) = h
        .s3
        .copy_object(
            &h.auth,
            "src",
            "a",
            None,
            "dst",
            "b",
            alarik_s3_core::MetadataDirective::Copy,
            PutObjectParams::default(),
        )
        .await
        .unwrap();
    assert!(
        result
            .etag
            .contains(&hex::encode(md5::Md5::digest(b"payload")))
    );

    let copied = h
        .s3
        .get_object(&h.auth, "dst", "b", None, None, true)
        .await
        .unwrap();
    let GetOutcome::Found(found) = copied else {
        panic!("expected copy");
    };
    assert_eq!(found.body.unwrap().as_ref(), b"payload");
    assert_eq!(found.record.content_type.as_deref(), Some("text/plain"));
}
