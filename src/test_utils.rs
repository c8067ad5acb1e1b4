// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and deployment fixtures.

use crate::config::DeploymentSpec;
use crate::plan::{DeclaredResource, HelmRelease};
use crate::registry::ApplyBackend;
use async_trait::async_trait;
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Add a response for GET requests matching the path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for POST requests matching the path
    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    /// Add a response for PATCH requests matching the path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    /// Add a response for DELETE requests matching the path
    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Every request received so far as (method, path), in arrival order
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        // Try exact match first
        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Longest prefix match for paths like /api/v1/namespaces/foo
        responses
            .iter()
            .filter(|((m, p), _)| m == method && path.starts_with(p.as_str()))
            .max_by_key(|((_, p), _)| p.len())
            .map(|(_, resp)| resp.clone())
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), path.clone()));
        let response = self.find_response(&method, &path);

        Box::pin(async move {
            match response {
                Some((status, body)) => Ok(Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(Body::from(body.into_bytes()))
                    .unwrap()),
                None => {
                    // Default 404 for unmatched requests
                    let body = not_found_json("resource", &path);
                    Ok(Response::builder()
                        .status(404)
                        .header("content-type", "application/json")
                        .body(Body::from(body.into_bytes()))
                        .unwrap())
                }
            }
        })
    }
}

/// Create a mock namespace JSON response
pub fn namespace_json(name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "uid": "test-uid"
        }
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

/// Create a failure Status response with the given code and reason
pub fn status_json(code: u16, reason: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": reason,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// Discovery document for a group version serving a single resource
pub fn api_resource_list_json(
    group_version: &str,
    plural: &str,
    kind: &str,
    namespaced: bool,
) -> String {
    serde_json::json!({
        "kind": "APIResourceList",
        "apiVersion": "v1",
        "groupVersion": group_version,
        "resources": [{
            "name": plural,
            "singularName": kind.to_lowercase(),
            "namespaced": namespaced,
            "kind": kind,
            "verbs": ["create", "delete", "get", "list", "patch", "update", "watch"]
        }]
    })
    .to_string()
}

/// Kubeconfig shaped like the one k3s writes, pointing at `server`
pub fn kubeconfig_for(server: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- cluster:
    insecure-skip-tls-verify: true
    server: {server}
  name: default
contexts:
- context:
    cluster: default
    user: default
  name: default
current-context: default
preferences: {{}}
users:
- name: default
  user:
    token: K10test::server:secret
"#,
        server = server
    )
}

/// A complete deployment description named `demo` with two synced deployments
pub fn deployment_spec() -> DeploymentSpec {
    DeploymentSpec::from_yaml(
        r#"
name: demo
region: us-east-1
instance:
  imageId: ami-0123456789abcdef0
gitops:
  release:
    version: "2.14.1"
  source:
    url: https://github.com/example/platform
    branch: main
  substitutions:
    data:
      cluster_name: demo
  deployments:
    - name: infrastructure
      path: ./infrastructure
      targetNamespace: infra
    - name: apps
      path: ./apps
      targetNamespace: apps
"#,
    )
    .unwrap()
}

/// `Kind/name` of a declared resource, as recorded by [`RecordingBackend`]
pub fn resource_key(resource: &DeclaredResource) -> String {
    match resource {
        DeclaredResource::Release(release) => format!("HelmRelease/{}", release.name),
        DeclaredResource::Manifest(manifest) => format!(
            "{}/{}",
            resource.kind(),
            manifest
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
        ),
    }
}

/// One call into [`RecordingBackend`]; `started` and `acked` share one sequence
#[derive(Debug, Clone)]
pub struct Submission {
    pub key: String,
    pub started: u64,
    pub acked: Option<u64>,
}

/// Apply backend that records when each resource was submitted and acknowledged
#[derive(Default)]
pub struct RecordingBackend {
    sequence: AtomicU64,
    submissions: Mutex<Vec<Submission>>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the acknowledgement of `key` (`Kind/name`) back by `delay`
    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    /// Reject the resource called `name`
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn submission(&self, key: &str) -> Option<Submission> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.key == key)
            .cloned()
    }

    /// Keys in the order they were submitted
    pub fn submitted(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.key.clone())
            .collect()
    }

    /// Keys in the order they were acknowledged
    pub fn acknowledged(&self) -> Vec<String> {
        let mut acked: Vec<Submission> = self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.acked.is_some())
            .cloned()
            .collect();
        acked.sort_by_key(|s| s.acked);
        acked.into_iter().map(|s| s.key).collect()
    }

    async fn record(&self, resource: &DeclaredResource) -> crate::error::Result<()> {
        let key = resource_key(resource);
        let name = key.split_once('/').map(|(_, n)| n.to_string()).unwrap_or_default();
        let started = self.sequence.fetch_add(1, Ordering::SeqCst);
        let index = {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push(Submission {
                key: key.clone(),
                started,
                acked: None,
            });
            submissions.len() - 1
        };

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&name) || self.failing.contains(&key) {
            return Err(crate::error::SeedError::apply(&key, "rejected by test backend"));
        }

        let acked = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().unwrap()[index].acked = Some(acked);
        Ok(())
    }
}

#[async_trait]
impl ApplyBackend for RecordingBackend {
    async fn install_release(&self, release: &HelmRelease) -> crate::error::Result<()> {
        self.record(&DeclaredResource::Release(release.clone())).await
    }

    async fn apply_manifest(&self, manifest: &Value) -> crate::error::Result<()> {
        self.record(&DeclaredResource::Manifest(manifest.clone())).await
    }
}
