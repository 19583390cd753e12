use std::sync::Arc;

use greet_rpc::{
    blog::{
        store::{DocumentStore, MemoryStore},
        Blog, BlogIdRequest, BlogMethod, BlogRequest, BlogResponse, BlogRpc, BlogService,
        BlogServiceRequest, BlogServiceResponse, DeleteBlogResponse, ListBlogRequest,
    },
    call::invoke,
    context::CallContext,
    transport::{
        client::{Client, ClientConfig},
        server::{Server, ServerConfig},
    },
    ProtocolError, ProtocolErrorType,
};
use tokio::{net::TcpListener, sync::oneshot};

fn blog(id: &str, title: &str) -> Blog {
    Blog {
        id: id.to_string(),
        author_id: "Deepak".to_string(),
        title: title.to_string(),
        content: format!("Content of {title}"),
    }
}

async fn unary(
    service: &BlogService,
    method: BlogMethod,
    request: BlogServiceRequest,
) -> Result<BlogServiceResponse, ProtocolError> {
    invoke::<BlogRpc, _>(service.clone(), method, Some(request), CallContext::new())
        .response()
        .await
}

async fn list(service: &BlogService) -> Result<Vec<Blog>, ProtocolError> {
    let mut call = invoke::<BlogRpc, _>(
        service.clone(),
        BlogMethod::ListBlog,
        Some(BlogServiceRequest::ListBlog(ListBlogRequest::default())),
        CallContext::new(),
    );
    let mut blogs = Vec::new();
    while let Some(response) = call.recv().await? {
        match response {
            BlogServiceResponse::ListBlog(response) => blogs.push(response.blog),
            other => panic!("unexpected response {other:?}"),
        }
    }
    call.finish().await?;
    Ok(blogs)
}

async fn create(service: &BlogService, title: &str) -> Blog {
    let response = unary(
        service,
        BlogMethod::CreateBlog,
        BlogServiceRequest::CreateBlog(BlogRequest {
            blog: blog("", title),
        }),
    )
    .await
    .unwrap();
    let BlogServiceResponse::CreateBlog(BlogResponse { blog }) = response else {
        panic!("unexpected response {response:?}");
    };
    blog
}

#[tokio::test]
async fn create_read_update_delete() {
    let service = BlogService::new(Arc::new(MemoryStore::new()));

    let created = create(&service, "My First Blog").await;
    assert_eq!(created.id.len(), 24);
    assert_eq!(created.title, "My First Blog");

    let read = unary(
        &service,
        BlogMethod::ReadBlog,
        BlogServiceRequest::ReadBlog(BlogIdRequest {
            blog_id: created.id.clone(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        read,
        BlogServiceResponse::ReadBlog(BlogResponse {
            blog: created.clone()
        })
    );

    let updated = unary(
        &service,
        BlogMethod::UpdateBlog,
        BlogServiceRequest::UpdateBlog(BlogRequest {
            blog: blog(&created.id, "My Updated Blog"),
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        updated,
        BlogServiceResponse::UpdateBlog(BlogResponse {
            blog: blog(&created.id, "My Updated Blog")
        })
    );

    let deleted = unary(
        &service,
        BlogMethod::DeleteBlog,
        BlogServiceRequest::DeleteBlog(BlogIdRequest {
            blog_id: created.id.clone(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        deleted,
        BlogServiceResponse::DeleteBlog(DeleteBlogResponse {
            blog_id: created.id.clone()
        })
    );

    let error = unary(
        &service,
        BlogMethod::ReadBlog,
        BlogServiceRequest::ReadBlog(BlogIdRequest {
            blog_id: created.id.clone(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::NotFound);
}

#[tokio::test]
async fn malformed_and_unknown_ids() {
    let service = BlogService::new(Arc::new(MemoryStore::new()));

    for method in [BlogMethod::ReadBlog, BlogMethod::DeleteBlog] {
        let request = BlogIdRequest {
            blog_id: "not-an-id".to_string(),
        };
        let request = match method {
            BlogMethod::ReadBlog => BlogServiceRequest::ReadBlog(request),
            _ => BlogServiceRequest::DeleteBlog(request),
        };
        let error = unary(&service, method, request).await.unwrap_err();
        assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
    }

    let error = unary(
        &service,
        BlogMethod::UpdateBlog,
        BlogServiceRequest::UpdateBlog(BlogRequest {
            blog: blog("", "No id"),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);

    let error = unary(
        &service,
        BlogMethod::UpdateBlog,
        BlogServiceRequest::UpdateBlog(BlogRequest {
            blog: blog("60eaf2ca7626531bf703318a", "Missing"),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::NotFound);

    let error = unary(
        &service,
        BlogMethod::DeleteBlog,
        BlogServiceRequest::DeleteBlog(BlogIdRequest {
            blog_id: "60eaf2ca7626531bf703318a".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::NotFound);
}

#[tokio::test]
async fn list_streams_every_blog_in_creation_order() {
    let service = BlogService::new(Arc::new(MemoryStore::new()));
    assert!(list(&service).await.unwrap().is_empty());

    let first = create(&service, "First").await;
    let second = create(&service, "Second").await;
    let third = create(&service, "Third").await;

    assert_eq!(list(&service).await.unwrap(), vec![first, second, third]);
}

#[tokio::test]
async fn disconnected_store_fails_as_internal() {
    let store = Arc::new(MemoryStore::new());
    let service = BlogService::new(store.clone());
    store.disconnect().await.unwrap();

    let error = list(&service).await.unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::Internal);
}

#[tokio::test]
async fn blog_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = Server::<BlogRpc, _>::new(
        BlogService::new(Arc::new(MemoryStore::new())),
        ServerConfig {
            address: address.clone(),
            ..Default::default()
        },
    );
    let handle = tokio::spawn(server.serve(listener, async move {
        stop_rx.await.ok();
    }));
    let client = Client::<BlogRpc>::connect(ClientConfig {
        address,
        ..Default::default()
    })
    .await
    .unwrap();

    let response = client
        .unary(
            BlogMethod::CreateBlog,
            BlogServiceRequest::CreateBlog(BlogRequest {
                blog: blog("", "My First Blog"),
            }),
        )
        .await
        .unwrap();
    let BlogServiceResponse::CreateBlog(BlogResponse { blog: created }) = response else {
        panic!("unexpected response {response:?}");
    };

    let error = client
        .unary(
            BlogMethod::ReadBlog,
            BlogServiceRequest::ReadBlog(BlogIdRequest {
                blog_id: "60eaf2ca7626531bf703318a".to_string(),
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::NotFound);

    let error = client
        .unary(
            BlogMethod::ReadBlog,
            BlogServiceRequest::ReadBlog(BlogIdRequest {
                blog_id: "60eaf2ca".to_string(),
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
    assert_eq!(error.to_string(), "Cannot parse ID");

    let mut call = client
        .call(
            BlogMethod::ListBlog,
            Some(BlogServiceRequest::ListBlog(ListBlogRequest::default())),
        )
        .unwrap();
    let mut blogs = Vec::new();
    while let Some(response) = call.recv().await.unwrap() {
        if let BlogServiceResponse::ListBlog(response) = response {
            blogs.push(response.blog);
        }
    }
    call.finish().await.unwrap();
    assert_eq!(blogs, vec![created]);

    drop(client);
    stop_tx.send(()).ok();
    handle.await.unwrap().unwrap();
}
