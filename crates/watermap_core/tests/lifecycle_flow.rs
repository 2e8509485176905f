use serde_json::json;
use watermap_core::db::open_db_in_memory;
use watermap_core::validator::geometry::parse_geometry;
use watermap_core::{
    Actor, Capability, GeometryError, LifecycleError, LifecycleService, LookupKey, ObjectStatus,
    ObjectTypeKind, PublishedQuery, UserRole, ValidationError, WaterObjectAttributes,
};

const RIVER_LINE: &str =
    r#"{"type":"LineString","coordinates":[[76.0,45.0],[77.0,46.0],[78.0,46.5]]}"#;
const RIVER_LINE_EXTENDED: &str =
    r#"{"type":"LineString","coordinates":[[76.0,45.0],[77.0,46.0],[78.0,46.5],[79.0,46.8]]}"#;
const LAKE_POLYGON: &str =
    r#"{"type":"Polygon","coordinates":[[[74.0,46.0],[75.0,46.0],[75.0,47.0],[74.0,47.0],[74.0,46.0]]]}"#;

const AUTHOR: Actor = Actor {
    user_id: 10,
    role: UserRole::Expert,
};
const OTHER_EXPERT: Actor = Actor {
    user_id: 11,
    role: UserRole::Expert,
};
const REVIEWER: Actor = Actor {
    user_id: 1,
    role: UserRole::Admin,
};

fn river(name: &str) -> WaterObjectAttributes {
    let mut attributes = WaterObjectAttributes::new(name, ObjectTypeKind::River);
    attributes.name_ru = Some("Или".to_string());
    attributes.length_km = Some(1439.0);
    attributes
}

fn lake(name: &str) -> WaterObjectAttributes {
    let mut attributes = WaterObjectAttributes::new(name, ObjectTypeKind::Lake);
    attributes.area_km2 = Some(16_400.0);
    attributes
}

#[test]
fn create_then_get_by_canonical_returns_draft_version_one() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    let created = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    let fetched = service
        .get_by_canonical(created.canonical_id, ObjectStatus::Draft)
        .unwrap()
        .expect("draft should be readable");

    assert_eq!(fetched.version, 1);
    assert_eq!(fetched.status, ObjectStatus::Draft);
    assert_eq!(fetched.geometry, parse_geometry(RIVER_LINE).unwrap());
    assert_eq!(fetched.attributes, river("Іле"));
    assert_eq!(fetched.created_by, AUTHOR.user_id);
    assert_eq!(fetched.rejection_reason, None);
    assert_eq!(fetched.published_at, None);
    assert_eq!(fetched, created);
}

#[test]
fn every_new_object_gets_its_own_canonical_id() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    let first = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    let second = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    assert_ne!(first.canonical_id, second.canonical_id);
    assert_ne!(first.id, second.id);
}

#[test]
fn invalid_input_never_reaches_storage() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    let blank = service.create(&river("  "), RIVER_LINE, AUTHOR).unwrap_err();
    assert!(matches!(
        blank,
        LifecycleError::Validation(ValidationError::NameRequired)
    ));

    let point = r#"{"type":"Point","coordinates":[76.9,43.2]}"#;
    let mismatch = service.create(&river("Іле"), point, AUTHOR).unwrap_err();
    assert!(matches!(
        mismatch,
        LifecycleError::Geometry(GeometryError::TypeMismatch { .. })
    ));
    assert_eq!(mismatch.code(), "geometry_type_mismatch");

    let empty = service.create(&river("Іле"), "", AUTHOR).unwrap_err();
    assert!(matches!(
        empty,
        LifecycleError::Geometry(GeometryError::EmptyGeometry)
    ));

    assert!(service.get_drafts_by_user(AUTHOR.user_id).unwrap().is_empty());
}

#[test]
fn readers_cannot_edit_and_experts_cannot_review() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let reader = Actor::new(50, UserRole::User);

    let err = service.create(&river("Іле"), RIVER_LINE, reader).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Forbidden {
            user_id: 50,
            required: Capability::Edit,
            ..
        }
    ));

    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    service.submit(draft.id, AUTHOR).unwrap();
    let err = service.approve(draft.id, AUTHOR).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Forbidden {
            required: Capability::Review,
            ..
        }
    ));
    assert_eq!(
        service.get_by_id(draft.id).unwrap().unwrap().status,
        ObjectStatus::Pending
    );
}

#[test]
fn sequential_updates_increment_version_by_one() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    let mut expected_version = draft.version;
    for length in [1440.0, 1441.5, 1450.0] {
        let mut attributes = river("Іле");
        attributes.length_km = Some(length);
        let updated = service
            .update(draft.id, &attributes, RIVER_LINE_EXTENDED, AUTHOR)
            .unwrap();

        expected_version += 1;
        assert_eq!(updated.version, expected_version);
        assert_eq!(updated.id, draft.id);
        assert_eq!(updated.canonical_id, draft.canonical_id);
        assert_eq!(updated.attributes.length_km, Some(length));
        assert_eq!(updated.updated_by, Some(AUTHOR.user_id));
    }
    assert_eq!(expected_version, 4);

    let history = service.get_version_history(draft.canonical_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, 4);
    assert_eq!(history[0].geometry, parse_geometry(RIVER_LINE_EXTENDED).unwrap());
}

#[test]
fn update_is_refused_outside_draft_and_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();

    service.submit(draft.id, AUTHOR).unwrap();
    let pending = service
        .update(draft.id, &river("Іле"), RIVER_LINE, AUTHOR)
        .unwrap_err();
    assert!(matches!(
        pending,
        LifecycleError::NotFound(LookupKey::Record(id)) if id == draft.id
    ));

    service.approve(draft.id, REVIEWER).unwrap();
    let published = service
        .update(draft.id, &river("Іле"), RIVER_LINE, AUTHOR)
        .unwrap_err();
    assert!(matches!(published, LifecycleError::NotFound(_)));

    let record = service.get_by_id(draft.id).unwrap().unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.status, ObjectStatus::Published);
}

#[test]
fn foreign_drafts_look_absent() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();

    for err in [
        service
            .update(draft.id, &river("Іле"), RIVER_LINE, OTHER_EXPERT)
            .unwrap_err(),
        service.submit(draft.id, OTHER_EXPERT).unwrap_err(),
        service.delete(draft.id, OTHER_EXPERT).unwrap_err(),
        service.submit(9_999, AUTHOR).unwrap_err(),
    ] {
        assert!(matches!(err, LifecycleError::NotFound(_)), "{err}");
        assert!(!err.is_retryable());
    }

    let untouched = service.get_by_id(draft.id).unwrap().unwrap();
    assert_eq!(untouched, draft);
}

#[test]
fn submit_moves_draft_to_pending_once() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();

    let pending = service.submit(draft.id, AUTHOR).unwrap();
    assert_eq!(pending.status, ObjectStatus::Pending);
    assert_eq!(pending.version, 1);

    assert!(matches!(
        service.submit(draft.id, AUTHOR).unwrap_err(),
        LifecycleError::NotFound(_)
    ));
    assert!(matches!(
        service.delete(draft.id, AUTHOR).unwrap_err(),
        LifecycleError::NotFound(_)
    ));
}

#[test]
fn approve_publishes_and_archives_previous_version() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    let first = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    service.submit(first.id, AUTHOR).unwrap();
    let initial = service.approve(first.id, REVIEWER).unwrap();
    assert_eq!(initial.archived, None);
    assert_eq!(initial.published.status, ObjectStatus::Published);
    assert_eq!(initial.published.reviewed_by, Some(REVIEWER.user_id));
    assert!(initial.published.published_at.is_some());

    let mut attributes = river("Іле");
    attributes.length_km = Some(1450.0);
    let revision = service
        .revise(first.canonical_id, &attributes, RIVER_LINE_EXTENDED, OTHER_EXPERT)
        .unwrap();
    assert_eq!(revision.version, 2);
    assert_eq!(revision.status, ObjectStatus::Draft);
    assert_eq!(revision.canonical_id, first.canonical_id);
    assert_ne!(revision.id, first.id);

    // The published version stays public while the revision is reviewed.
    service.submit(revision.id, OTHER_EXPERT).unwrap();
    let still_public = service
        .get_by_canonical(first.canonical_id, ObjectStatus::Published)
        .unwrap()
        .unwrap();
    assert_eq!(still_public.id, first.id);

    let promotion = service.approve(revision.id, REVIEWER).unwrap();
    assert_eq!(promotion.archived, Some(first.id));
    assert_eq!(promotion.published.id, revision.id);

    let archived = service.get_by_id(first.id).unwrap().unwrap();
    assert_eq!(archived.status, ObjectStatus::Archived);
    let published = service
        .get_by_canonical(first.canonical_id, ObjectStatus::Published)
        .unwrap()
        .unwrap();
    assert_eq!(published.id, revision.id);
    assert_eq!(published.attributes.length_km, Some(1450.0));

    let history = service.get_version_history(first.canonical_id).unwrap();
    let versions: Vec<_> = history
        .iter()
        .map(|summary| (summary.version, summary.status))
        .collect();
    assert_eq!(
        versions,
        vec![(2, ObjectStatus::Published), (1, ObjectStatus::Archived)]
    );
}

#[test]
fn approve_and_reject_require_pending_target() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();

    assert!(matches!(
        service.approve(draft.id, REVIEWER).unwrap_err(),
        LifecycleError::NotFound(_)
    ));
    assert!(matches!(
        service.reject(draft.id, REVIEWER, "coarse").unwrap_err(),
        LifecycleError::NotFound(_)
    ));
    assert!(matches!(
        service.approve(123_456, REVIEWER).unwrap_err(),
        LifecycleError::NotFound(LookupKey::Record(123_456))
    ));
}

#[test]
fn reject_requires_reason_and_update_withdraws_it() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&lake("Балқаш"), LAKE_POLYGON, AUTHOR).unwrap();
    service.submit(draft.id, AUTHOR).unwrap();

    let err = service.reject(draft.id, REVIEWER, "   ").unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Validation(ValidationError::RejectionReasonRequired)
    ));
    assert_eq!(
        service.get_by_id(draft.id).unwrap().unwrap().status,
        ObjectStatus::Pending
    );

    let rejected = service
        .reject(draft.id, REVIEWER, " shoreline too coarse ")
        .unwrap();
    assert_eq!(rejected.status, ObjectStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("shoreline too coarse")
    );
    assert_eq!(rejected.reviewed_by, Some(REVIEWER.user_id));

    let mut attributes = lake("Балқаш");
    attributes.max_depth_m = Some(26.0);
    let edited = service
        .update(draft.id, &attributes, LAKE_POLYGON, AUTHOR)
        .unwrap();
    assert_eq!(edited.status, ObjectStatus::Draft);
    assert_eq!(edited.rejection_reason, None);
    assert_eq!(edited.version, 2);

    let resubmitted = service.submit(draft.id, AUTHOR).unwrap();
    assert_eq!(resubmitted.status, ObjectStatus::Pending);
}

#[test]
fn rejected_version_can_be_resubmitted_directly() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&lake("Алакөл"), LAKE_POLYGON, AUTHOR).unwrap();
    service.submit(draft.id, AUTHOR).unwrap();
    service.reject(draft.id, REVIEWER, "missing depth").unwrap();

    let pending = service.submit(draft.id, AUTHOR).unwrap();
    assert_eq!(pending.status, ObjectStatus::Pending);
    assert_eq!(pending.rejection_reason, None);
    assert_eq!(pending.version, 1);
}

#[test]
fn delete_removes_own_draft_only() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();

    service.delete(draft.id, AUTHOR).unwrap();
    assert!(service.get_by_id(draft.id).unwrap().is_none());
    assert!(matches!(
        service.delete(draft.id, AUTHOR).unwrap_err(),
        LifecycleError::NotFound(_)
    ));
}

#[test]
fn revise_needs_published_version_and_no_open_revision() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();
    let draft = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();

    let err = service
        .revise(draft.canonical_id, &river("Іле"), RIVER_LINE, AUTHOR)
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::NotFound(LookupKey::Canonical(id)) if id == draft.canonical_id
    ));

    service.submit(draft.id, AUTHOR).unwrap();
    service.approve(draft.id, REVIEWER).unwrap();
    let revision = service
        .revise(draft.canonical_id, &river("Іле"), RIVER_LINE, AUTHOR)
        .unwrap();

    let err = service
        .revise(draft.canonical_id, &river("Іле"), RIVER_LINE, OTHER_EXPERT)
        .unwrap_err();
    match err {
        LifecycleError::RevisionOpen {
            canonical_id,
            record_id,
        } => {
            assert_eq!(canonical_id, draft.canonical_id);
            assert_eq!(record_id, revision.id);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn published_listing_filters_orders_and_pages() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    for attributes in [lake("Балқаш"), lake("Алакөл"), river("Іле")] {
        let raw = match attributes.object_type {
            ObjectTypeKind::River => RIVER_LINE,
            _ => LAKE_POLYGON,
        };
        let draft = service.create(&attributes, raw, AUTHOR).unwrap();
        service.submit(draft.id, AUTHOR).unwrap();
        service.approve(draft.id, REVIEWER).unwrap();
    }
    service.create(&lake("Зайсан"), LAKE_POLYGON, AUTHOR).unwrap();

    let lakes = service
        .get_published(&PublishedQuery {
            object_type: Some(ObjectTypeKind::Lake),
            ..PublishedQuery::default()
        })
        .unwrap();
    let names: Vec<_> = lakes.iter().map(|item| item.name_kz.as_str()).collect();
    assert_eq!(names, vec!["Алакөл", "Балқаш"]);

    let all = service.get_published(&PublishedQuery::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|item| item.status == ObjectStatus::Published));

    let second_page = service
        .get_published(&PublishedQuery {
            object_type: None,
            limit: Some(1),
            offset: 1,
        })
        .unwrap();
    // Names sort by code point, so the Kazakh-only letter І precedes А.
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].name_kz, "Алакөл");

    let collection = service
        .published_feature_collection(&PublishedQuery::default())
        .unwrap();
    assert_eq!(collection.metadata.total, 3);
    let value: serde_json::Value =
        serde_json::from_str(&collection.to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "FeatureCollection");
    assert_eq!(value["features"][0]["properties"]["name_kz"], "Іле");
}

#[test]
fn pending_queue_and_author_dashboard() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    let first = service.create(&lake("Балқаш"), LAKE_POLYGON, AUTHOR).unwrap();
    let second = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    let foreign = service
        .create(&lake("Алакөл"), LAKE_POLYGON, OTHER_EXPERT)
        .unwrap();
    let published = service.create(&lake("Зайсан"), LAKE_POLYGON, AUTHOR).unwrap();
    service.submit(published.id, AUTHOR).unwrap();
    service.approve(published.id, REVIEWER).unwrap();

    service.submit(first.id, AUTHOR).unwrap();
    service.submit(second.id, AUTHOR).unwrap();
    service.submit(foreign.id, OTHER_EXPERT).unwrap();
    service.reject(foreign.id, REVIEWER, "wrong basin").unwrap();

    let queue: Vec<_> = service
        .get_pending()
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(queue, vec![first.id, second.id]);

    let mine: Vec<_> = service
        .get_drafts_by_user(AUTHOR.user_id)
        .unwrap()
        .into_iter()
        .map(|summary| summary.id)
        .collect();
    assert_eq!(mine.len(), 2);
    assert!(mine.contains(&first.id) && mine.contains(&second.id));

    let theirs = service.get_drafts_by_user(OTHER_EXPERT.user_id).unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].status, ObjectStatus::Rejected);
}

#[test]
fn review_diff_compares_pending_with_published() {
    let conn = open_db_in_memory().unwrap();
    let service = LifecycleService::for_connection(&conn).unwrap();

    let first = service.create(&river("Іле"), RIVER_LINE, AUTHOR).unwrap();
    service.submit(first.id, AUTHOR).unwrap();

    let initial = service.review_diff(first.id, REVIEWER).unwrap();
    assert!(initial.published.is_none());
    let name_change = initial
        .changes
        .iter()
        .find(|change| change.field == "name_kz")
        .expect("new object lists every field");
    assert_eq!(name_change.before, json!(null));
    assert_eq!(name_change.after, json!("Іле"));

    service.approve(first.id, REVIEWER).unwrap();
    let mut attributes = river("Іле");
    attributes.length_km = Some(1450.0);
    let revision = service
        .revise(first.canonical_id, &attributes, RIVER_LINE, AUTHOR)
        .unwrap();
    service.submit(revision.id, AUTHOR).unwrap();

    let diff = service.review_diff(revision.id, REVIEWER).unwrap();
    assert_eq!(diff.pending.id, revision.id);
    assert_eq!(diff.published.as_ref().map(|record| record.id), Some(first.id));
    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].field, "length_km");
    assert_eq!(diff.changes[0].before, json!(1439.0));
    assert_eq!(diff.changes[0].after, json!(1450.0));

    assert!(matches!(
        service.review_diff(first.id, REVIEWER).unwrap_err(),
        LifecycleError::NotFound(_)
    ));
    assert!(matches!(
        service.review_diff(revision.id, AUTHOR).unwrap_err(),
        LifecycleError::Forbidden { .. }
    ));
}
