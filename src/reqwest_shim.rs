use crate::error::Error;
use bytes::{BufMut, Bytes, BytesMut};
use futures_core::{ready, stream::BoxStream, Stream};
use pin_project_lite::pin_project;
use reqwest::Response;
use std::{
    future::Future,
    mem,
    pin::Pin,
    task::{Context, Poll},
};

pin_project! {
    pub struct BytesFuture {
        #[pin]
        stream: BoxStream<'static, reqwest::Result<Bytes>>,
        limit: usize,
        aggregator: BytesMut,
    }
}

impl Future for BytesFuture {
    type Output = Result<Bytes, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            let this = self.as_mut().project();
            if let Some(chunk) = ready!(this.stream.poll_next(cx)).transpose()? {
                this.aggregator.put(chunk);
                if this.aggregator.len() > *this.limit {
                    return Poll::Ready(Err(Error::ResponseBodyLimit));
                }

                continue;
            }

            break;
        }

        Poll::Ready(Ok(mem::take(&mut self.aggregator).freeze()))
    }
}

/// Reqwest doesn't limit the response body size by default nor does it offer an option to
/// configure one. Responses come from untrusted servers, so reading them without a limit is a
/// DoS hazard.
pub(crate) trait ResponseExt {
    /// Read the whole body, failing with [Error::ResponseBodyLimit] once it exceeds `limit` bytes
    fn bytes_limited(self, limit: usize) -> BytesFuture;
}

impl ResponseExt for Response {
    fn bytes_limited(self, limit: usize) -> BytesFuture {
        BytesFuture {
            stream: Box::pin(self.bytes_stream()),
            limit,
            aggregator: BytesMut::new(),
        }
    }
}
