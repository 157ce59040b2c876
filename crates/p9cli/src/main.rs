use {
    clap::{Parser, Subcommand},
    futures::future::try_join_all,
    rs9p_client::{session::DEFAULT_MSIZE, *},
    std::sync::Arc,
    tokio::io::{self, AsyncReadExt, AsyncWriteExt},
};

mod utils;
use crate::utils::*;

#[derive(Debug, clap::Parser)]
struct Cli {
    /// proto!address!port
    /// where: proto = tcp | unix
    address: String,

    /// Maximum message size to propose
    #[arg(long, default_value_t = DEFAULT_MSIZE)]
    msize: u32,

    /// User name to attach as
    #[arg(long, default_value = "nobody")]
    uname: String,

    /// Remote tree to attach to
    #[arg(long, default_value = "/")]
    aname: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Copy a file to stdout
    Cat { path: String },
    /// Show attributes of one or more files
    Stat {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Copy stdin into an existing file
    Put { path: String },
    /// Set the size of a file
    Truncate { path: String, size: u64 },
}

async fn ls(root: &RemoteFile, path: &str) -> Result<()> {
    let dir = lookup(root, path).await?;
    let entries = dir.readdir().await;
    dir.clunk().await?;

    for entry in entries? {
        if entry.name == "." || entry.name == ".." {
            continue;
        }
        if entry.qid.is_dir() {
            println!("{}/", entry.name);
        } else {
            println!("{}", entry.name);
        }
    }
    Ok(())
}

async fn cat(root: &RemoteFile, path: &str) -> Result<()> {
    let mut file = lookup(root, path).await?;
    let mut buf = vec![0; root.session().msize() as usize];
    let mut stdout = io::stdout();
    let mut offset = 0;

    loop {
        let n = file.read(&mut buf, offset).await?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n]).await?;
        offset += n as u64;
    }

    stdout.flush().await?;
    file.clunk().await
}

async fn stat(root: &RemoteFile, path: &str) -> Result<(String, Stat)> {
    let file = lookup(root, path).await?;
    let attrs = file.getattr(Stat::default()).await;
    file.clunk().await?;
    Ok((path.to_owned(), attrs?))
}

async fn put(root: &RemoteFile, path: &str) -> Result<()> {
    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data).await?;

    let mut file = lookup(root, path).await?;
    file.truncate(0).await?;

    let mut offset = 0;
    while offset < data.len() {
        let n = file.write(&data[offset..], offset as u64).await?;
        if n == 0 {
            return res!(io_err!(WriteZero, "server accepted no data"));
        }
        offset += n;
    }

    file.clunk().await
}

async fn truncate(root: &RemoteFile, path: &str, size: u64) -> Result<()> {
    let file = lookup(root, path).await?;
    let truncated = file.truncate(size).await;
    file.clunk().await?;
    truncated
}

async fn p9cli_main(
    Cli {
        address,
        msize,
        uname,
        aname,
        command,
    }: Cli,
) -> rs9p_client::Result<i32> {
    let config = SessionConfig::default()
        .msize(msize)
        .uname(uname)
        .aname(aname);
    let session = Arc::new(Session::connect(&address, config).await?);
    let root = RemoteFile::attach(&session).await?;

    match command {
        Command::Ls { path } => ls(&root, &path).await?,
        Command::Cat { path } => cat(&root, &path).await?,
        Command::Stat { paths } => {
            let stats = try_join_all(paths.iter().map(|path| stat(&root, path))).await?;
            for (path, attrs) in stats {
                println!(
                    "{} {:>10} {:>12} {}",
                    format_mode(attrs.mode),
                    attrs.size,
                    attrs.mtime.sec,
                    path
                );
            }
        }
        Command::Put { path } => put(&root, &path).await?,
        Command::Truncate { path, size } => truncate(&root, &path, size).await?,
    }

    root.clunk().await?;
    session.shutdown().await?;
    Ok(0)
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = p9cli_main(Cli::parse()).await.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        -1
    });

    std::process::exit(exit_code);
}
