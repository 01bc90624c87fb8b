// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the binding reconciler.

#[cfg(test)]
mod tests {
    use super::super::{
        apply_cluster_role_binding, apply_role_binding, reconcile_bindings, ApplyOutcome,
        BindingOwner, BindingSpec, RoleRef, Subject,
    };
    use crate::errors::{ReconcileError, StoreError};
    use crate::labels::{MANAGED_BY_GROUP, MANAGED_BY_USER};
    use crate::store::memory::MemoryStore;
    use k8s_openapi::api::rbac::v1 as rbac;

    fn alice() -> BindingOwner {
        BindingOwner {
            subject: Subject::service_account("alice", "team-a"),
            namespace: "team-a".to_string(),
            managed_by: MANAGED_BY_USER,
        }
    }

    fn devs() -> BindingOwner {
        BindingOwner {
            subject: Subject::group("devs"),
            namespace: "ns1".to_string(),
            managed_by: MANAGED_BY_GROUP,
        }
    }

    fn rbac_subject(kind: &str, name: &str, namespace: Option<&str>) -> rbac::Subject {
        rbac::Subject {
            api_group: None,
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    // ========== Subject ==========

    #[test]
    fn test_subject_rbac_forms() {
        let sa = Subject::service_account("alice", "team-a").to_rbac();
        assert_eq!(sa.kind, "ServiceAccount");
        assert_eq!(sa.namespace.as_deref(), Some("team-a"));
        assert!(sa.api_group.is_none());

        let group = Subject::group("devs").to_rbac();
        assert_eq!(group.kind, "Group");
        assert_eq!(group.api_group.as_deref(), Some("rbac.authorization.k8s.io"));
        assert!(group.namespace.is_none());
    }

    #[test]
    fn test_subject_matches_kind_and_name() {
        let group = Subject::group("devs");
        assert!(group.matches(&rbac_subject("Group", "devs", None)));
        assert!(!group.matches(&rbac_subject("ServiceAccount", "devs", Some("ns1"))));
        assert!(!group.matches(&rbac_subject("Group", "ops", None)));
    }

    #[test]
    fn test_service_account_match_requires_namespace() {
        let sa = Subject::service_account("alice", "team-a");
        assert!(sa.matches(&rbac_subject("ServiceAccount", "alice", Some("team-a"))));
        assert!(!sa.matches(&rbac_subject("ServiceAccount", "alice", Some("team-b"))));
        assert!(!sa.matches(&rbac_subject("User", "alice", None)));
    }

    #[test]
    fn test_subject_display() {
        assert_eq!(
            Subject::service_account("alice", "team-a").to_string(),
            "ServiceAccount:team-a/alice"
        );
        assert_eq!(Subject::group("devs").to_string(), "Group:devs");
    }

    // ========== Naming ==========

    #[test]
    fn test_binding_name_uses_spec_namespace() {
        let spec = BindingSpec::namespaced("prod", RoleRef::cluster_role("view"));
        assert_eq!(alice().binding_name(&spec), "alice-prod-view");
    }

    #[test]
    fn test_binding_name_uses_owner_namespace_as_cluster_marker() {
        let spec = BindingSpec::cluster("admin");
        assert_eq!(alice().binding_name(&spec), "alice-team-a-admin");
    }

    #[test]
    fn test_with_subject_deduplicates() {
        let spec = BindingSpec::cluster("view")
            .with_subject(Subject::group("ops"))
            .with_subject(Subject::group("ops"));
        assert_eq!(spec.extra_subjects(), &[Subject::group("ops")]);
    }

    #[test]
    fn test_owner_subject_listed_first_and_not_duplicated() {
        let spec = BindingSpec::cluster("view")
            .with_subject(Subject::service_account("alice", "team-a"))
            .with_subject(Subject::group("ops"));
        let binding = alice().cluster_role_binding(&spec);
        let subjects = binding.subjects.unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].name, "alice");
        assert_eq!(subjects[1].kind, "Group");
        assert_eq!(subjects[1].name, "ops");
    }

    // ========== reconcile_bindings() ==========

    #[tokio::test]
    async fn test_namespaced_cluster_role_becomes_role_binding() {
        let store = MemoryStore::with_namespaces(&["team-a"]);
        let desired = vec![BindingSpec::namespaced(
            "team-a",
            RoleRef::cluster_role("view"),
        )];

        let applied = reconcile_bindings(&store, &alice(), &desired).await.unwrap();

        assert_eq!(applied.created, vec!["RoleBinding team-a/alice-team-a-view"]);
        let rb = store.role_binding("team-a", "alice-team-a-view").unwrap();
        assert_eq!(rb.role_ref.kind, "ClusterRole");
        assert_eq!(rb.role_ref.name, "view");
        assert!(store.all_cluster_role_bindings().is_empty());
    }

    #[tokio::test]
    async fn test_unscoped_cluster_role_becomes_cluster_role_binding() {
        let store = MemoryStore::with_namespaces(&["team-a"]);
        let desired = vec![BindingSpec::cluster("admin")];

        reconcile_bindings(&store, &alice(), &desired).await.unwrap();

        let crb = store.cluster_role_binding("alice-team-a-admin").unwrap();
        assert_eq!(crb.role_ref.kind, "ClusterRole");
        assert!(store.all_role_bindings().is_empty());
    }

    #[tokio::test]
    async fn test_group_role_binding() {
        let store = MemoryStore::with_namespaces(&["ns1"]);
        let desired = vec![BindingSpec::namespaced("ns1", RoleRef::role("edit"))];

        reconcile_bindings(&store, &devs(), &desired).await.unwrap();

        let rb = store.role_binding("ns1", "devs-ns1-edit").unwrap();
        assert_eq!(rb.role_ref.kind, "Role");
        assert_eq!(rb.role_ref.name, "edit");
        let subjects = rb.subjects.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].kind, "Group");
        assert_eq!(subjects[0].name, "devs");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = MemoryStore::with_namespaces(&["team-a"]);
        let desired = vec![
            BindingSpec::namespaced("team-a", RoleRef::cluster_role("view")),
            BindingSpec::cluster("admin"),
        ];

        let first = reconcile_bindings(&store, &alice(), &desired).await.unwrap();
        let rbs = store.all_role_bindings();
        let crbs = store.all_cluster_role_bindings();

        let second = reconcile_bindings(&store, &alice(), &desired).await.unwrap();

        assert_eq!(first.created.len(), 2);
        assert!(second.created.is_empty());
        assert_eq!(second.updated.len(), 2);
        assert_eq!(store.all_role_bindings(), rbs);
        assert_eq!(store.all_cluster_role_bindings(), crbs);
    }

    #[tokio::test]
    async fn test_conflict_overwrites_foreign_subjects() {
        let store = MemoryStore::with_namespaces(&["team-a"]);
        let desired = vec![BindingSpec::namespaced(
            "team-a",
            RoleRef::cluster_role("view"),
        )];
        let mut existing = alice().role_binding(&desired[0], "team-a");
        existing
            .subjects
            .get_or_insert_with(Vec::new)
            .push(rbac_subject("ServiceAccount", "mallory", Some("team-a")));
        store.put_role_binding("team-a", existing);

        let applied = reconcile_bindings(&store, &alice(), &desired).await.unwrap();

        assert_eq!(applied.updated.len(), 1);
        let subjects = store
            .role_binding("team-a", "alice-team-a-view")
            .unwrap()
            .subjects
            .unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, "alice");
    }

    #[tokio::test]
    async fn test_changed_role_ref_recreates_binding() {
        let store = MemoryStore::with_namespaces(&["team-a"]);
        let role_spec = BindingSpec::namespaced("team-a", RoleRef::role("view"));
        store.put_role_binding("team-a", alice().role_binding(&role_spec, "team-a"));

        let desired = vec![BindingSpec::namespaced(
            "team-a",
            RoleRef::cluster_role("view"),
        )];
        let applied = reconcile_bindings(&store, &alice(), &desired).await.unwrap();

        assert_eq!(applied.recreated, vec!["RoleBinding team-a/alice-team-a-view"]);
        let rb = store.role_binding("team-a", "alice-team-a-view").unwrap();
        assert_eq!(rb.role_ref.kind, "ClusterRole");
        assert_eq!(store.calls("delete_role_binding"), 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_item() {
        let store = MemoryStore::with_namespaces(&["team-a", "prod"]);
        store.fail(
            "create_role_binding",
            "alice-prod-view",
            StoreError::other("RoleBinding", "prod/alice-prod-view", "forbidden"),
        );
        let desired = vec![
            BindingSpec::namespaced("prod", RoleRef::cluster_role("view")),
            BindingSpec::namespaced("team-a", RoleRef::cluster_role("view")),
        ];

        let err = reconcile_bindings(&store, &alice(), &desired)
            .await
            .unwrap_err();

        match err {
            ReconcileError::Partial { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].item, "RoleBinding prod/alice-prod-view");
            }
            other => panic!("expected Partial, got {other:?}"),
        }
        assert!(store.role_binding("team-a", "alice-team-a-view").is_some());
    }

    #[tokio::test]
    async fn test_missing_target_namespace_is_item_failure() {
        let store = MemoryStore::with_namespaces(&["team-a"]);
        let desired = vec![BindingSpec::namespaced(
            "nowhere",
            RoleRef::cluster_role("view"),
        )];

        let err = reconcile_bindings(&store, &alice(), &desired)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Partial { .. }));
    }

    #[tokio::test]
    async fn test_colliding_specs_first_wins() {
        let store = MemoryStore::with_namespaces(&["team-a"]);
        // Same namespace and role name, different roleRef kind: same object name
        let desired = vec![
            BindingSpec::namespaced("team-a", RoleRef::cluster_role("view")),
            BindingSpec::namespaced("team-a", RoleRef::role("view")),
        ];

        let err = reconcile_bindings(&store, &alice(), &desired)
            .await
            .unwrap_err();

        match err {
            ReconcileError::Partial { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].reason.contains("collides"));
            }
            other => panic!("expected Partial, got {other:?}"),
        }
        let rb = store.role_binding("team-a", "alice-team-a-view").unwrap();
        assert_eq!(rb.role_ref.kind, "ClusterRole");
        assert_eq!(store.calls("create_role_binding"), 1);
    }

    #[tokio::test]
    async fn test_empty_desired_set_is_noop() {
        let store = MemoryStore::new();
        let applied = reconcile_bindings(&store, &devs(), &[]).await.unwrap();
        assert!(applied.is_empty());
        assert!(store.call_log().is_empty());
    }

    // ========== apply_*() ==========

    #[tokio::test]
    async fn test_apply_role_binding_retries_create_after_vanished_conflict() {
        let store = MemoryStore::with_namespaces(&["ns1"]);
        let spec = BindingSpec::namespaced("ns1", RoleRef::role("edit"));
        let binding = devs().role_binding(&spec, "ns1");
        store.fail(
            "create_role_binding",
            "devs-ns1-edit",
            StoreError::conflict("RoleBinding", "ns1/devs-ns1-edit"),
        );

        // Conflict on create, then NotFound on read, then the second create fails too
        let err = apply_role_binding(&store, "ns1", &binding).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.calls("get_role_binding"), 1);
        assert_eq!(store.calls("create_role_binding"), 2);
    }

    #[tokio::test]
    async fn test_apply_cluster_role_binding_replaces_on_conflict() {
        let store = MemoryStore::new();
        let spec = BindingSpec::cluster("view");
        let binding = devs().cluster_role_binding(&spec);

        let first = apply_cluster_role_binding(&store, &binding).await.unwrap();
        let second = apply_cluster_role_binding(&store, &binding).await.unwrap();

        assert_eq!(first, ApplyOutcome::Created);
        assert_eq!(second, ApplyOutcome::Updated);
        assert_eq!(store.calls("replace_cluster_role_binding"), 1);
    }

    #[tokio::test]
    async fn test_apply_cluster_role_binding_recreates_on_role_ref_change() {
        let store = MemoryStore::new();
        let old = devs().cluster_role_binding(&BindingSpec::cluster("view"));
        store.put_cluster_role_binding(old);

        let mut desired = devs().cluster_role_binding(&BindingSpec::cluster("view"));
        desired.role_ref.name = "edit".to_string();

        let outcome = apply_cluster_role_binding(&store, &desired).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Recreated);
        assert_eq!(
            store.cluster_role_binding("devs-ns1-view").unwrap().role_ref.name,
            "edit"
        );
    }
}
