//! Pod mutation
//!
//! Handles AdmissionReview requests for Pod creation, adding
//! `spec.nodeSelector: {nodepool: <namespace>}` unless the namespace is
//! excluded.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use crds::default_node_selector;
use json_patch::{AddOperation, Patch, PatchOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::WebhookState;

/// Requests rejected before an admission review could be read
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("empty body")]
    EmptyBody,

    #[error("invalid Content-Type, expect `application/json`")]
    UnsupportedContentType,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::EmptyBody => StatusCode::BAD_REQUEST,
            WebhookError::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        };
        (status, self.to_string()).into_response()
    }
}

/// Handle a mutating admission review
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    if body.is_empty() {
        warn!("Rejecting admission request with empty body");
        return Err(WebhookError::EmptyBody);
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !is_json(content_type) {
        warn!(content_type, "Rejecting admission request with unsupported Content-Type");
        return Err(WebhookError::UnsupportedContentType);
    }

    let request: Result<AdmissionRequest<DynamicObject>, String> =
        serde_json::from_slice::<AdmissionReview<DynamicObject>>(&body)
            .map_err(|e| e.to_string())
            .and_then(|review| {
                let request: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
                request.map_err(|e| e.to_string())
            });
    let (response, decision) = match request {
        Ok(request) => mutate_pod(&state, &request),
        Err(message) => {
            warn!(error = %message, "Failed to decode admission review");
            (AdmissionResponse::invalid(message), Decision::Denied)
        }
    };

    state.metrics.record_admission(decision.as_str());
    Ok(Json(response.into_review()))
}

/// Outcome of an admission review, as counted in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Patched,
    Allowed,
    Denied,
}

impl Decision {
    fn as_str(self) -> &'static str {
        match self {
            Decision::Patched => "patched",
            Decision::Allowed => "allowed",
            Decision::Denied => "denied",
        }
    }
}

fn is_json(content_type: &str) -> bool {
    content_type.split(';').next().map(str::trim) == Some("application/json")
}

/// Decide on a single admission request
pub(crate) fn mutate_pod(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> (AdmissionResponse, Decision) {
    let uid = request.uid.as_str();
    let allow = || (AdmissionResponse::from(request), Decision::Allowed);

    if request.kind.kind != "Pod" || request.operation != Operation::Create {
        debug!(uid, kind = %request.kind.kind, operation = ?request.operation, "Not a Pod creation, allowing unchanged");
        return allow();
    }

    let pod = match request.object.clone().map(DynamicObject::try_parse::<Pod>).transpose() {
        Ok(Some(pod)) => pod,
        Ok(None) => {
            debug!(uid, "No pod object in request, allowing unchanged");
            return allow();
        }
        Err(e) => {
            warn!(uid, error = %e, "Failed to decode pod");
            return (AdmissionResponse::from(request).deny(e.to_string()), Decision::Denied);
        }
    };

    let Some(namespace) = request.namespace.clone().or(pod.metadata.namespace) else {
        warn!(uid, "Pod has no namespace, allowing unchanged");
        return allow();
    };

    if state.exclusions.contains(&namespace) {
        debug!(uid, namespace = %namespace, "Namespace excluded, allowing unchanged");
        return allow();
    }

    info!(
        uid,
        namespace = %namespace,
        pod = ?pod.metadata.name.or(pod.metadata.generate_name),
        "Injecting NodePool node selector"
    );
    match AdmissionResponse::from(request).with_patch(node_selector_patch(&namespace)) {
        Ok(response) => (response, Decision::Patched),
        Err(e) => {
            warn!(uid, error = %e, "Failed to serialize patch");
            let response = AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"));
            (response, Decision::Denied)
        }
    }
}

/// Patch adding the namespace's pool selector as the pod's node selector
pub fn node_selector_patch(namespace: &str) -> Patch {
    let selector: serde_json::Map<String, Value> = default_node_selector(namespace)
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Patch(vec![PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["spec", "nodeSelector"]),
        value: Value::Object(selector),
    })])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExclusionSet;
    use crate::metrics::Metrics;
    use crate::webhook::webhook_router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_state() -> Arc<WebhookState> {
        Arc::new(WebhookState::new(
            Arc::new(ExclusionSet::new(["kube-system"])),
            Arc::new(Metrics::new().unwrap()),
        ))
    }

    fn review(kind: &str, namespace: &str, object: Value) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": { "group": "", "version": "v1", "kind": kind },
                "resource": { "group": "", "version": "v1", "resource": "pods" },
                "requestKind": { "group": "", "version": "v1", "kind": kind },
                "requestResource": { "group": "", "version": "v1", "resource": "pods" },
                "name": "web",
                "namespace": namespace,
                "operation": "CREATE",
                "userInfo": { "username": "admin" },
                "object": object,
                "oldObject": null,
                "dryRun": false,
                "options": null
            }
        })
    }

    fn pod(namespace: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "web", "namespace": namespace },
            "spec": { "containers": [{ "name": "web", "image": "nginx:latest" }] }
        })
    }

    async fn post(state: Arc<WebhookState>, content_type: &str, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
        let response = webhook_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mutating")
                    .header(CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn post_review(state: Arc<WebhookState>, review: Value) -> Value {
        let (status, body) = post(state, "application/json", serde_json::to_vec(&review).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_node_selector_patch() {
        let patch = serde_json::to_value(node_selector_patch("team-a")).unwrap();
        assert_eq!(
            patch,
            json!([{ "op": "add", "path": "/spec/nodeSelector", "value": { "nodepool": "team-a" } }])
        );
    }

    #[test]
    fn test_content_type_matching() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(!is_json("text/plain"));
        assert!(!is_json(""));
    }

    #[tokio::test]
    async fn test_pod_in_namespace_gets_patch() {
        let state = test_state();
        let body = post_review(state.clone(), review("Pod", "team-a", pod("team-a"))).await;

        let response = &body["response"];
        assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response["allowed"], true);
        assert_eq!(response["patchType"], "JSONPatch");
        let patch: Vec<u8> = serde_json::from_value(response["patch"].clone()).unwrap();
        let patch: Value = serde_json::from_slice(&patch).unwrap();
        assert_eq!(
            patch,
            json!([{ "op": "add", "path": "/spec/nodeSelector", "value": { "nodepool": "team-a" } }])
        );
        assert!(state.metrics.render().unwrap().contains(r#"decision="patched"} 1"#));
    }

    #[tokio::test]
    async fn test_pod_in_excluded_namespace_allowed_without_patch() {
        let body = post_review(test_state(), review("Pod", "kube-system", pod("kube-system"))).await;

        let response = &body["response"];
        assert_eq!(response["allowed"], true);
        assert!(response.get("patch").is_none_or(Value::is_null));
    }

    #[tokio::test]
    async fn test_non_pod_kind_allowed_without_patch() {
        let object = json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "cfg" } });
        let body = post_review(test_state(), review("ConfigMap", "team-a", object)).await;

        assert_eq!(body["response"]["allowed"], true);
        assert!(body["response"].get("patch").is_none_or(Value::is_null));
    }

    #[tokio::test]
    async fn test_undecodable_pod_is_denied() {
        let mut object = pod("team-a");
        object["spec"]["containers"] = json!("not-a-list");
        let body = post_review(test_state(), review("Pod", "team-a", object)).await;

        assert_eq!(body["response"]["allowed"], false);
        assert!(body["response"].get("patch").is_none_or(Value::is_null));
    }

    #[tokio::test]
    async fn test_undecodable_review_returns_invalid_envelope() {
        let state = test_state();
        let (status, body) = post(state.clone(), "application/json", b"not json".to_vec()).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["response"]["allowed"], false);
        assert!(body.to_string().contains("expected"));
        assert!(state.metrics.render().unwrap().contains(r#"decision="denied"} 1"#));
    }

    #[tokio::test]
    async fn test_empty_body_is_bad_request() {
        let (status, body) = post(test_state(), "application/json", Vec::new()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"empty body");
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_unsupported() {
        let review = serde_json::to_vec(&review("Pod", "team-a", pod("team-a"))).unwrap();
        let (status, body) = post(test_state(), "text/plain", review).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(String::from_utf8(body).unwrap(), "invalid Content-Type, expect `application/json`");
    }
}
