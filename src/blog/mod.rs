//! The blog service: create, read, update, delete and list blog records kept
//! in a [`DocumentStore`](store::DocumentStore).

mod convert;
mod service;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::{
    service::{Method, Rpc},
    session::CallShape,
};

pub use service::BlogService;

/// A blog as stored, without its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogItem {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

/// A blog as exchanged with clients. `id` is ignored on creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blog {
    #[serde(default)]
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl Blog {
    pub fn from_item(id: String, item: BlogItem) -> Self {
        Self {
            id,
            author_id: item.author_id,
            title: item.title,
            content: item.content,
        }
    }

    pub fn into_item(self) -> BlogItem {
        BlogItem {
            author_id: self.author_id,
            title: self.title,
            content: self.content,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogRequest {
    pub blog: Blog,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogIdRequest {
    pub blog_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBlogRequest {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogResponse {
    pub blog: Blog,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBlogResponse {
    pub blog_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlogMethod {
    CreateBlog,
    ReadBlog,
    UpdateBlog,
    DeleteBlog,
    ListBlog,
}

impl BlogMethod {
    pub const ALL: [BlogMethod; 5] = [
        BlogMethod::CreateBlog,
        BlogMethod::ReadBlog,
        BlogMethod::UpdateBlog,
        BlogMethod::DeleteBlog,
        BlogMethod::ListBlog,
    ];
}

impl Method for BlogMethod {
    fn name(self) -> &'static str {
        match self {
            BlogMethod::CreateBlog => "createBlog",
            BlogMethod::ReadBlog => "readBlog",
            BlogMethod::UpdateBlog => "updateBlog",
            BlogMethod::DeleteBlog => "deleteBlog",
            BlogMethod::ListBlog => "listBlog",
        }
    }

    fn shape(self) -> CallShape {
        match self {
            BlogMethod::ListBlog => CallShape::ServerStreaming,
            _ => CallShape::Unary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlogServiceRequest {
    CreateBlog(BlogRequest),
    ReadBlog(BlogIdRequest),
    UpdateBlog(BlogRequest),
    DeleteBlog(BlogIdRequest),
    ListBlog(ListBlogRequest),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlogServiceResponse {
    CreateBlog(BlogResponse),
    ReadBlog(BlogResponse),
    UpdateBlog(BlogResponse),
    DeleteBlog(DeleteBlogResponse),
    ListBlog(BlogResponse),
}

#[derive(Debug)]
pub struct BlogRpc;

impl Rpc for BlogRpc {
    type Method = BlogMethod;
    type Request = BlogServiceRequest;
    type Response = BlogServiceResponse;
}
