use std::{
    sync::Arc,
    task::{Context, Poll},
};

use futures::StreamExt;
use tower::Service;
use tracing::info;

use crate::{
    handler,
    service::{Incoming, Method, ServiceError, ServiceFuture, ServiceResponse},
    ProtocolError,
};

use super::{
    store::{DocumentStore, RecordId},
    Blog, BlogIdRequest, BlogMethod, BlogRequest, BlogResponse, BlogRpc, BlogServiceRequest,
    BlogServiceResponse, DeleteBlogResponse,
};

/// Serves blog records from an explicitly provided store.
#[derive(Clone)]
pub struct BlogService {
    store: Arc<dyn DocumentStore>,
}

impl BlogService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn dispatch(
        store: Arc<dyn DocumentStore>,
        incoming: Incoming<BlogRpc>,
    ) -> Result<ServiceResponse<BlogServiceResponse>, ProtocolError> {
        let Incoming {
            method,
            request,
            mut session,
        } = incoming;
        info!("{} request", method.name());

        Ok(match (method, request) {
            (BlogMethod::CreateBlog, Some(BlogServiceRequest::CreateBlog(request))) => {
                ServiceResponse::Single(BlogServiceResponse::CreateBlog(
                    create_blog(store.as_ref(), request).await?,
                ))
            }
            (BlogMethod::ReadBlog, Some(BlogServiceRequest::ReadBlog(request))) => {
                ServiceResponse::Single(BlogServiceResponse::ReadBlog(
                    read_blog(store.as_ref(), request).await?,
                ))
            }
            (BlogMethod::UpdateBlog, Some(BlogServiceRequest::UpdateBlog(request))) => {
                ServiceResponse::Single(BlogServiceResponse::UpdateBlog(
                    update_blog(store.as_ref(), request).await?,
                ))
            }
            (BlogMethod::DeleteBlog, Some(BlogServiceRequest::DeleteBlog(request))) => {
                ServiceResponse::Single(BlogServiceResponse::DeleteBlog(
                    delete_blog(store.as_ref(), request).await?,
                ))
            }
            (BlogMethod::ListBlog, Some(BlogServiceRequest::ListBlog(_))) => {
                let blogs = store.list_all().await?.map(|record| -> Result<_, ProtocolError> {
                    let (id, item) = record?;
                    Ok(BlogServiceResponse::ListBlog(BlogResponse {
                        blog: Blog::from_item(id.to_string(), item),
                    }))
                });
                handler::server_streaming(&mut session, blogs).await?;
                ServiceResponse::Streamed
            }
            (method, request) => {
                return Err(ProtocolError::invalid_argument(format!(
                    "{} cannot handle {:?}",
                    method.name(),
                    request
                )))
            }
        })
    }
}

impl Service<Incoming<BlogRpc>> for BlogService {
    type Response = ServiceResponse<BlogServiceResponse>;
    type Error = ServiceError;
    type Future = ServiceFuture<ServiceResponse<BlogServiceResponse>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, incoming: Incoming<BlogRpc>) -> Self::Future {
        let store = self.store.clone();
        Box::pin(async move { Ok(Self::dispatch(store, incoming).await?) })
    }
}

async fn create_blog(
    store: &dyn DocumentStore,
    request: BlogRequest,
) -> Result<BlogResponse, ProtocolError> {
    let item = request.blog.into_item();
    let id = store.insert(item.clone()).await?;
    Ok(BlogResponse {
        blog: Blog::from_item(id.to_string(), item),
    })
}

async fn read_blog(
    store: &dyn DocumentStore,
    request: BlogIdRequest,
) -> Result<BlogResponse, ProtocolError> {
    let id: RecordId = request.blog_id.parse()?;
    let item = store.find_by_id(id).await?;
    Ok(BlogResponse {
        blog: Blog::from_item(id.to_string(), item),
    })
}

async fn update_blog(
    store: &dyn DocumentStore,
    request: BlogRequest,
) -> Result<BlogResponse, ProtocolError> {
    let id: RecordId = request.blog.id.parse()?;
    let item = request.blog.into_item();
    store.replace(id, item.clone()).await?;
    Ok(BlogResponse {
        blog: Blog::from_item(id.to_string(), item),
    })
}

async fn delete_blog(
    store: &dyn DocumentStore,
    request: BlogIdRequest,
) -> Result<DeleteBlogResponse, ProtocolError> {
    let id: RecordId = request.blog_id.parse()?;
    store.delete(id).await?;
    Ok(DeleteBlogResponse {
        blog_id: id.to_string(),
    })
}
