//! Text templates for the generated build file, manifests and the default
//! entry point. Rendering is pure: identical targets render identical bytes.

use crate::target::DeploymentTarget;

/// Environment variable the synthesized server reads as its example secret.
pub const EXAMPLE_SECRET_KEY: &str = "MY_SECRET_KEY";

pub fn render_dockerfile(target: &DeploymentTarget) -> String {
    format!(
        r#"# Generated by kindeploy. Overwritten on every run.

# Build stage: a static Go binary.
FROM golang:1.23-alpine AS builder

WORKDIR /app

COPY . .

# TARGETARCH is provided by BuildKit; when empty Go builds for the host.
ARG TARGETARCH
RUN CGO_ENABLED=0 GOOS=linux GOARCH=${{TARGETARCH}} go build -ldflags="-s -w" -o /out/main .

# Runtime stage: nothing but the binary.
FROM gcr.io/distroless/static-debian12

WORKDIR /app

COPY --from=builder /out/main /app/main

EXPOSE {port}

ENTRYPOINT ["/app/main"]
"#,
        port = target.port
    )
}

pub fn render_deployment(target: &DeploymentTarget) -> String {
    format!(
        r#"# Generated by kindeploy. Overwritten on every run.
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {deployment}
  labels:
    app: {name}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {name}
  template:
    metadata:
      labels:
        app: {name}
    spec:
      containers:
        - name: {container}
          image: {image}
          # The image is loaded into kind directly and never pulled.
          imagePullPolicy: IfNotPresent
          ports:
            - containerPort: {port}
          env:
            - name: PORT
              value: "{port}"
          envFrom:
            - secretRef:
                name: {secret}
                optional: true
"#,
        deployment = target.deployment_name(),
        name = target.name,
        container = target.container_name(),
        image = target.image_tag,
        port = target.port,
        secret = target.secret_name,
    )
}

pub fn render_service(target: &DeploymentTarget) -> String {
    format!(
        r#"# Generated by kindeploy. Overwritten on every run.
apiVersion: v1
kind: Service
metadata:
  name: {service}
  labels:
    app: {name}
spec:
  type: NodePort
  selector:
    app: {name}
  ports:
    - name: http
      protocol: TCP
      port: {port}
      targetPort: {port}
"#,
        service = target.service_name(),
        name = target.name,
        port = target.port,
    )
}

pub fn render_entry_point(target: &DeploymentTarget) -> String {
    format!(
        r#"package main

import (
	"fmt"
	"log"
	"net/http"
	"os"
	"time"
)

func main() {{
	port := os.Getenv("PORT")
	if port == "" {{
		port = "{port}"
	}}

	secretStatus := "(not set)"
	if os.Getenv("{secret_key}") != "" {{
		secretStatus = "set"
	}}

	hostname, _ := os.Hostname()

	http.HandleFunc("/", func(w http.ResponseWriter, r *http.Request) {{
		start := time.Now()
		fmt.Fprintf(w, "Hello from {name} on host '%s'!\n", hostname)
		fmt.Fprintf(w, "   Port: %s\n", port)
		fmt.Fprintf(w, "   Secret {secret_key}: %s\n", secretStatus)
		fmt.Fprintf(w, "   Client Address: %s\n", r.RemoteAddr)
		fmt.Fprintf(w, "   Request Path: %s\n", r.URL.Path)
		log.Printf("request from %s for %s (served by %s) in %v", r.RemoteAddr, r.URL.Path, hostname, time.Since(start))
	}})

	addr := fmt.Sprintf(":%s", port)
	log.Printf("starting {name} on host '%s', listening on %s (secret {secret_key}: %s)", hostname, addr, secretStatus)
	log.Fatal(http.ListenAndServe(addr, nil))
}}
"#,
        port = target.port,
        name = target.name,
        secret_key = EXAMPLE_SECRET_KEY,
    )
}

pub fn render_go_mod(target: &DeploymentTarget) -> String {
    format!("module {}\n\ngo 1.23\n", target.name)
}

/// Keeps the local secret file and the manifests out of the build context.
pub fn render_dockerignore() -> String {
    ".env\ndeployment.yaml\nservice.yaml\n.git\n".to_string()
}
