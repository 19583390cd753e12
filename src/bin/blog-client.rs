use clap::{Args, Parser, Subcommand};
use greet_rpc::{
    blog::{
        Blog, BlogIdRequest, BlogMethod, BlogRequest, BlogRpc, BlogServiceRequest,
        BlogServiceResponse, ListBlogRequest,
    },
    transport::client::{Client, ClientConfig},
    util::init_tracing,
    ProtocolErrorType, ServiceError,
};
use tracing::{error, info};

#[derive(Debug, Args)]
struct BlogArgs {
    #[arg(long, default_value = "Deepak")]
    author_id: String,
    #[arg(long, default_value = "My First Blog")]
    title: String,
    #[arg(long, default_value = "Content of the first Blog")]
    content: String,
}

impl BlogArgs {
    fn into_blog(self, id: String) -> Blog {
        Blog {
            id,
            author_id: self.author_id,
            title: self.title,
            content: self.content,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a blog and print its id.
    Create(BlogArgs),
    /// Read a blog by id.
    Read { blog_id: String },
    /// Replace the contents of a blog.
    Update {
        blog_id: String,
        #[command(flatten)]
        blog: BlogArgs,
    },
    /// Delete a blog by id.
    Delete { blog_id: String },
    /// List every blog.
    List,
    /// Create, read, update and delete a blog, then list what is left.
    Walkthrough,
}

/// A client for the blog server.
#[derive(Parser, Debug)]
#[command(about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// The address of the server.
    #[arg(long, default_value = "localhost:50051")]
    address: String,
}

fn print_response(response: BlogServiceResponse) {
    match response {
        BlogServiceResponse::CreateBlog(response) => info!("Blog has been created: {:?}", response.blog),
        BlogServiceResponse::ReadBlog(response) => info!("Blog was read: {:?}", response.blog),
        BlogServiceResponse::UpdateBlog(response) => {
            info!("Blog has been updated: {:?}", response.blog)
        }
        BlogServiceResponse::DeleteBlog(response) => info!("Blog was deleted: {}", response.blog_id),
        BlogServiceResponse::ListBlog(response) => info!("{:?}", response.blog),
    }
}

async fn list(client: &Client<BlogRpc>) -> Result<(), ServiceError> {
    let mut call = client.call(
        BlogMethod::ListBlog,
        Some(BlogServiceRequest::ListBlog(ListBlogRequest::default())),
    )?;
    while let Some(response) = call.recv().await? {
        print_response(response);
    }
    call.finish().await?;
    Ok(())
}

async fn walkthrough(client: &Client<BlogRpc>) -> Result<(), ServiceError> {
    info!("Create a blog");
    let created = client
        .unary(
            BlogMethod::CreateBlog,
            BlogServiceRequest::CreateBlog(BlogRequest {
                blog: Blog {
                    id: String::new(),
                    author_id: "Deepak".to_string(),
                    title: "My First Blog".to_string(),
                    content: "Content of the first Blog".to_string(),
                },
            }),
        )
        .await?;
    let BlogServiceResponse::CreateBlog(created) = created else {
        return Err("createBlog returned an unexpected response".into());
    };
    let blog_id = created.blog.id.clone();
    info!("Blog has been created: {:?}", created.blog);

    info!("Reading a blog that does not exist");
    if let Err(e) = client
        .unary(
            BlogMethod::ReadBlog,
            BlogServiceRequest::ReadBlog(BlogIdRequest {
                blog_id: "60eaf2ca7626531bf703318a".to_string(),
            }),
        )
        .await
    {
        error!("Error happened while reading: {}", e);
    }
    print_response(
        client
            .unary(
                BlogMethod::ReadBlog,
                BlogServiceRequest::ReadBlog(BlogIdRequest {
                    blog_id: blog_id.clone(),
                }),
            )
            .await?,
    );

    info!("Update a blog");
    print_response(
        client
            .unary(
                BlogMethod::UpdateBlog,
                BlogServiceRequest::UpdateBlog(BlogRequest {
                    blog: Blog {
                        id: blog_id.clone(),
                        author_id: "Deepak Mahana".to_string(),
                        title: "My Updated Blog".to_string(),
                        content: "Content of the updated Blog".to_string(),
                    },
                }),
            )
            .await?,
    );

    match client
        .unary(
            BlogMethod::DeleteBlog,
            BlogServiceRequest::DeleteBlog(BlogIdRequest { blog_id }),
        )
        .await
    {
        Ok(response) => print_response(response),
        Err(e) => error!("Error happened while deleting: {}", e),
    }

    list(client).await
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    init_tracing()?;

    let cli = Cli::parse();

    let client = Client::<BlogRpc>::connect(ClientConfig {
        address: cli.address,
        ..Default::default()
    })
    .await?;

    let request = match cli.command {
        Command::Create(blog) => BlogServiceRequest::CreateBlog(BlogRequest {
            blog: blog.into_blog(String::new()),
        }),
        Command::Read { blog_id } => BlogServiceRequest::ReadBlog(BlogIdRequest { blog_id }),
        Command::Update { blog_id, blog } => BlogServiceRequest::UpdateBlog(BlogRequest {
            blog: blog.into_blog(blog_id),
        }),
        Command::Delete { blog_id } => BlogServiceRequest::DeleteBlog(BlogIdRequest { blog_id }),
        Command::List => return list(&client).await,
        Command::Walkthrough => return walkthrough(&client).await,
    };
    let method = match &request {
        BlogServiceRequest::CreateBlog(_) => BlogMethod::CreateBlog,
        BlogServiceRequest::ReadBlog(_) => BlogMethod::ReadBlog,
        BlogServiceRequest::UpdateBlog(_) => BlogMethod::UpdateBlog,
        BlogServiceRequest::DeleteBlog(_) => BlogMethod::DeleteBlog,
        BlogServiceRequest::ListBlog(_) => BlogMethod::ListBlog,
    };
    match client.unary(method, request).await {
        Ok(response) => print_response(response),
        Err(e) if e.error_type == ProtocolErrorType::NotFound => {
            error!("No blog with that id: {}", e)
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
