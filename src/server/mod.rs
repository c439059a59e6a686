//! # HTTP 服务层
//!
//! ## 设计思路
//!
//! 接口面刻意保持很小：一个合成端点、一个健康检查，外加 CORS 预检。
//! HTTP 层只做协议适配（multipart 解析、状态码映射、CORS 头），
//! 全部业务语义都在 `tryon` 模块内完成。
//!
//! ## 实现思路
//!
//! - `tiny_http` 阻塞式接收循环，每个请求一个处理线程。
//! - 业务编排是 async 的，处理线程通过 `tokio::runtime::Handle::block_on` 桥接。
//! - 错误统一序列化为 `{"error": {"code", "stage", "message"}}`，
//!   状态码由 `TryOnError::status` 决定。

pub mod multipart;

use std::io::{self, Read};
use std::thread;

use serde_json::json;
use tiny_http::{Header, Method, Request, Response, Server};
use tokio::runtime::Handle;

use crate::tryon::{TryOnError, TryOnRequest, TryOnService, VisionBackend};

/// 请求体读取上限的富余量（multipart 边界与头部开销）。
const BODY_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// 已绑定端口、尚未进入接收循环的服务器。
///
/// 拆分绑定与运行两步，测试可以先拿到实际端口再发请求。
pub struct AppServer<B> {
    service: TryOnService<B>,
    runtime: Handle,
    server: Server,
}

impl<B: VisionBackend + 'static> AppServer<B> {
    /// 绑定监听端口（`port` 为 0 时由系统分配）。
    pub fn bind(service: TryOnService<B>, runtime: Handle, port: u16) -> Result<Self, TryOnError> {
        let server = Server::http(("0.0.0.0", port))
            .map_err(|e| TryOnError::Network(format!("无法绑定端口 {}：{}", port, e)))?;

        Ok(Self {
            service,
            runtime,
            server,
        })
    }

    /// 实际监听端口。
    pub fn local_port(&self) -> u16 {
        self.server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(0)
    }

    /// 进入阻塞式请求循环（每个请求一个处理线程）。
    pub fn run(self) {
        log::info!("🌐 试穿服务已启动 - http://0.0.0.0:{}", self.local_port());

        for request in self.server.incoming_requests() {
            let service = self.service.clone();
            let runtime = self.runtime.clone();

            thread::spawn(move || {
                let method = request.method().clone();
                let url = request.url().to_string();
                if let Err(err) = route(request, &service, &runtime) {
                    log::warn!("⚠️ 响应写入失败 - {} {}: {}", method, url, err);
                }
            });
        }
    }
}

fn route<B: VisionBackend>(
    request: Request,
    service: &TryOnService<B>,
    runtime: &Handle,
) -> io::Result<()> {
    let path = request.url().split('?').next().unwrap_or("/").to_string();

    match (request.method().clone(), path.as_str()) {
        (Method::Options, _) => respond_preflight(request),
        (Method::Get, "/health") => respond_json(request, 200, &json!({ "status": "ok" })),
        (Method::Post, "/try-on") => handle_try_on(request, service, runtime),
        _ => respond_json(
            request,
            404,
            &json!({
                "error": {
                    "code": "E_NOT_FOUND",
                    "stage": "route",
                    "message": format!("未知路径：{path}"),
                }
            }),
        ),
    }
}

fn handle_try_on<B: VisionBackend>(
    mut request: Request,
    service: &TryOnService<B>,
    runtime: &Handle,
) -> io::Result<()> {
    let config = match service.config_snapshot() {
        Ok(config) => config,
        Err(err) => return respond_error(request, &err),
    };

    // 两个上传文件 + multipart 开销
    let body_limit = config.max_upload_bytes.saturating_mul(2) + BODY_OVERHEAD_BYTES;
    if let Some(declared) = request.body_length() {
        if declared as u64 > body_limit {
            let err = TryOnError::ResourceLimit(format!(
                "请求体声明体积过大：{:.2} MB",
                declared as f64 / 1024.0 / 1024.0
            ));
            return respond_error(request, &err);
        }
    }

    let boundary = request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Content-Type"))
        .map(|header| header.value.as_str().to_string())
        .and_then(|value| multipart::boundary_from_content_type(&value));
    let Some(boundary) = boundary else {
        let err = TryOnError::MissingInput("请求必须是 multipart/form-data".to_string());
        return respond_error(request, &err);
    };

    let mut body = Vec::new();
    if let Err(err) = request.as_reader().take(body_limit + 1).read_to_end(&mut body) {
        let err = TryOnError::Network(format!("读取请求体失败：{err}"));
        return respond_error(request, &err);
    }
    if body.len() as u64 > body_limit {
        let err = TryOnError::ResourceLimit("请求体超过允许的体积上限".to_string());
        return respond_error(request, &err);
    }

    let parts = match multipart::parse_form(&body, &boundary) {
        Ok(parts) => parts,
        Err(err) => return respond_error(request, &err),
    };
    let overlay_width_hint = match multipart::text_field_as_f64(&parts, "overlay_width") {
        Ok(hint) => hint,
        Err(err) => return respond_error(request, &err),
    };

    let mut subject = None;
    let mut overlay = None;
    for part in parts {
        match part.field.as_str() {
            "subject" => subject = Some(part),
            "overlay" => overlay = Some(part),
            other => log::debug!("⏭️ 忽略未知表单字段：{}", other),
        }
    }

    let outcome = runtime.block_on(service.try_on(TryOnRequest {
        subject,
        overlay,
        overlay_width_hint,
    }));

    match outcome {
        Ok(rendered) => {
            let mut response = Response::from_data(rendered.bytes).with_status_code(200);
            if let Ok(header) = Header::from_bytes("Content-Type", rendered.mime.as_bytes()) {
                response = response.with_header(header);
            }
            request.respond(with_cors(response))
        }
        Err(err) => respond_error(request, &err),
    }
}

fn respond_error(request: Request, err: &TryOnError) -> io::Result<()> {
    respond_json(
        request,
        err.status(),
        &json!({
            "error": {
                "code": err.code(),
                "stage": err.stage(),
                "message": err.to_string(),
            }
        }),
    )
}

fn respond_json(request: Request, status: u16, body: &serde_json::Value) -> io::Result<()> {
    let mut response = Response::from_string(body.to_string()).with_status_code(status);
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json; charset=utf-8") {
        response = response.with_header(header);
    }
    request.respond(with_cors(response))
}

fn respond_preflight(request: Request) -> io::Result<()> {
    let response = Response::empty(204);
    request.respond(with_cors(response))
}

fn with_cors<R: Read>(mut response: Response<R>) -> Response<R> {
    for (name, value) in [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
        ("Access-Control-Allow-Headers", "Content-Type"),
    ] {
        if let Ok(header) = Header::from_bytes(name, value) {
            response = response.with_header(header);
        }
    }
    response
}

