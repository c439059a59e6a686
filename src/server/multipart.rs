//! # multipart/form-data 解析
//!
//! ## 设计思路
//!
//! 上传接口只需要固定的三个字段（两个文件 + 一个可选文本），因此这里实现
//! 一个面向该场景的最小解析器，而不是引入完整的流式 multipart 协议栈。
//! 解析失败一律归类为客户端错误：请求体格式由调用方负责。
//!
//! ## 实现思路
//!
//! - 先从 `Content-Type` 头提取 boundary。
//! - 按 `--boundary` 分隔符切分请求体，逐段解析头部与数据。
//! - 数据段按原始字节保留（文件内容可以包含任意 `\r\n`）。

use crate::tryon::{TryOnError, UploadedPart};

/// 从 `Content-Type` 头中提取 multipart boundary。
///
/// 非 multipart 请求返回 `None`。
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    let (kind, params) = value.split_once(';')?;
    if !kind.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    for param in params.split(';') {
        let (key, raw) = match param.split_once('=') {
            Some(pair) => pair,
            None => continue,
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = raw.trim().trim_matches('"');
            if !boundary.is_empty() {
                return Some(boundary.to_string());
            }
        }
    }

    None
}

/// 解析 multipart 请求体，返回全部表单分片。
pub fn parse_form(body: &[u8], boundary: &str) -> Result<Vec<UploadedPart>, TryOnError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut parts = Vec::new();

    let mut cursor = find_subslice(body, &delimiter, 0)
        .ok_or_else(|| malformed("未找到 multipart 边界"))?
        + delimiter.len();

    loop {
        // 边界行之后：`--` 表示结束，`\r\n` 表示新分片
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if !body[cursor..].starts_with(b"\r\n") {
            return Err(malformed("multipart 边界行格式错误"));
        }
        cursor += 2;

        let headers_end = find_subslice(body, b"\r\n\r\n", cursor)
            .ok_or_else(|| malformed("multipart 分片缺少头部结束标记"))?;
        let headers = std::str::from_utf8(&body[cursor..headers_end])
            .map_err(|_| malformed("multipart 分片头部不是有效 UTF-8"))?;

        let data_start = headers_end + 4;
        let next_delimiter = find_subslice(body, &delimiter, data_start)
            .ok_or_else(|| malformed("multipart 分片缺少结束边界"))?;
        if next_delimiter < data_start + 2 || &body[next_delimiter - 2..next_delimiter] != b"\r\n" {
            return Err(malformed("multipart 分片数据段未以 CRLF 结尾"));
        }

        parts.push(parse_part(headers, &body[data_start..next_delimiter - 2])?);
        cursor = next_delimiter + delimiter.len();
    }

    Ok(parts)
}

/// 按字段名查找分片。
pub fn find_part<'a>(parts: &'a [UploadedPart], field: &str) -> Option<&'a UploadedPart> {
    parts.iter().find(|part| part.field == field)
}

/// 将文本分片解析为浮点数（字段缺失或内容为空返回 `None`）。
pub fn text_field_as_f64(parts: &[UploadedPart], field: &str) -> Result<Option<f64>, TryOnError> {
    let Some(part) = find_part(parts, field) else {
        return Ok(None);
    };

    let text = std::str::from_utf8(&part.bytes)
        .map_err(|_| malformed(&format!("{field} 字段不是有效 UTF-8 文本")))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }

    text.parse::<f64>()
        .map(Some)
        .map_err(|_| malformed(&format!("{field} 字段不是有效数字：{text}")))
}

fn parse_part(headers: &str, data: &[u8]) -> Result<UploadedPart, TryOnError> {
    let mut field = None;
    let mut filename = None;
    let mut content_type = None;

    for line in headers.split("\r\n") {
        let (name, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };

        if name.trim().eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';') {
                let Some((key, raw)) = param.split_once('=') else {
                    continue;
                };
                let unquoted = raw.trim().trim_matches('"').to_string();
                match key.trim().to_ascii_lowercase().as_str() {
                    "name" => field = Some(unquoted),
                    "filename" => filename = Some(unquoted),
                    _ => {}
                }
            }
        } else if name.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let field = field.ok_or_else(|| malformed("multipart 分片缺少 name 参数"))?;

    Ok(UploadedPart {
        field,
        filename,
        content_type,
        bytes: data.to_vec(),
    })
}

fn malformed(detail: &str) -> TryOnError {
    TryOnError::MissingInput(detail.to_string())
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }

    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
