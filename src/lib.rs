//! # 宠物服饰虚拟试穿服务 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     客户端 (任意 HTTP)                    │
//! │                                                          │
//! │   POST /try-on (multipart: subject + overlay + 宽度提示)  │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ HTTP (PNG 或 JSON 错误)
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            服务端 (Rust)                          │
//! │                                                          │
//! │  ┌─ server ────── tiny_http 路由 + multipart 解析         │
//! │  │                                                       │
//! │  └─ tryon ─────── 试穿流水线                              │
//! │      ├─ service / handler   状态注入 + 流程编排            │
//! │      ├─ temp                临时产物 (RAII)               │
//! │      ├─ pipeline            解码 + 像素限制 + 缩放         │
//! │      ├─ vision / anchor     视觉定位 + 几何中心回退        │
//! │      ├─ placement           尺寸与坐标纯计算               │
//! │      └─ compositor          alpha 叠加 + PNG 编码         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`server`] | HTTP 接入层：路由、multipart 解析、状态码与 CORS |
//! | [`tryon`] | 完整试穿流水线：校验、落盘、解码、定位、合成 |

pub mod server;
pub mod tryon;
