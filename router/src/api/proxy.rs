//! バックエンドプロキシのレスポンス転送

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use futures::TryStreamExt;
use std::io;
use tracing::warn;

/// バックエンドのレスポンスをクライアントへストリーミング転送する
///
/// ステータスコードとContent-Typeをミラーし、ボディはバッファリング
/// せずそのまま流す。非2xxのエラーボディも加工せず素通しする。
/// ヘッダー送出後のストリームエラーはステータスを変えられないため、
/// ログに残してストリームを打ち切る。
pub(crate) fn forward_streaming_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).cloned();

    let stream = response.bytes_stream().map_err(|e| {
        warn!(error = %e, "Upstream stream aborted mid-response");
        io::Error::other(e)
    });

    let mut axum_response = Response::new(Body::from_stream(stream));
    *axum_response.status_mut() = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);

    // reqwest(http 0.2)とaxum(http 1.x)で型が異なるためバイト列経由で写す
    if let Some(value) = content_type {
        if let Ok(header_value) = HeaderValue::from_bytes(value.as_bytes()) {
            axum_response
                .headers_mut()
                .insert(header::CONTENT_TYPE, header_value);
        }
    }

    axum_response
}
