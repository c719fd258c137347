use proto::{request::Request, response::Response};
use utilities::{
    logger::{instrument, trace, tracing},
    result::Result,
};

use crate::namenode::service::NamenodeService;

pub const HELP: &str = "\
commands:
  mkdir <parent_path> <directory_name>
  rmdir <directory_path>
  mv <source_path> <destination_path>
  upload <local_path> <dfs_path>      local_path is read on the namenode host
  download <dfs_path> <local_path>    local_path is written on the namenode host
  ls <dfs_path>
  tree <dfs_path>
  status
  register <data_node_id> <address> <port>
  heartbeat <data_node_id>
  help
wrap a path holding spaces in single or double quotes, e.g. mkdir / \"my docs\"";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Send(Request),
    Help,
    Empty,
}

fn args<const N: usize>(inputs: &[String], usage: &str) -> Result<[String; N]> {
    if inputs.len() != N + 1 {
        return Err(format!("Invalid usage, expected: {usage}").into());
    }
    Ok(std::array::from_fn(|i| inputs[i + 1].clone()))
}

/// Splits on whitespace outside of quotes. A quoted span joins the word it
/// touches, so `"a b"c` is the single word `a bc`.
fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => word.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            None => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if let Some(open) = quote {
        return Err(format!("Unterminated {open} quote").into());
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        Self::from_words(split_words(line)?)
    }

    /// Builds a command out of already split words, e.g. process arguments.
    pub fn from_words(inputs: Vec<String>) -> Result<Self> {
        let Some(command) = inputs.first() else {
            return Ok(Command::Empty);
        };
        let request = match command.as_str() {
            "mkdir" => {
                let [parent_path, directory_name] =
                    args(&inputs, "mkdir <parent_path> <directory_name>")?;
                Request::CreateDirectory {
                    parent_path,
                    directory_name,
                }
            }
            "rmdir" => {
                let [directory_path] = args(&inputs, "rmdir <directory_path>")?;
                Request::DeleteDirectory { directory_path }
            }
            "mv" => {
                let [source_path, destination_path] =
                    args(&inputs, "mv <source_path> <destination_path>")?;
                Request::MoveFile {
                    source_path,
                    destination_path,
                }
            }
            "upload" => {
                let [local_path, dfs_path] = args(&inputs, "upload <local_path> <dfs_path>")?;
                Request::UploadFile {
                    local_path,
                    dfs_path,
                }
            }
            "download" => {
                let [dfs_path, local_path] = args(&inputs, "download <dfs_path> <local_path>")?;
                Request::DownloadFile {
                    dfs_path,
                    local_path,
                }
            }
            "ls" => {
                let [dfs_path] = args(&inputs, "ls <dfs_path>")?;
                Request::ListDirectoryContents { dfs_path }
            }
            "tree" => {
                let [dfs_path] = args(&inputs, "tree <dfs_path>")?;
                Request::TraverseDirectory { dfs_path }
            }
            "status" => {
                let [] = args(&inputs, "status")?;
                Request::Status
            }
            "register" => {
                let [data_node_id, data_node_address, port] =
                    args(&inputs, "register <data_node_id> <address> <port>")?;
                Request::Register {
                    data_node_id,
                    data_node_address,
                    data_node_port: port
                        .parse::<u16>()
                        .map_err(|e| format!("Invalid port {port:?} : {e}"))?,
                }
            }
            "heartbeat" => {
                let [data_node_id] = args(&inputs, "heartbeat <data_node_id>")?;
                Request::Heartbeat { data_node_id }
            }
            "help" => return Ok(Command::Help),
            unknown => {
                return Err(format!("Unknown command {unknown:?}, use <help> to get help").into());
            }
        };
        Ok(Command::Send(request))
    }
}

pub struct CommandRunner {
    namenode: NamenodeService,
}
impl CommandRunner {
    pub fn new(namenode: NamenodeService) -> Self {
        CommandRunner { namenode }
    }

    pub async fn handle_input(&self, line: &str) -> Result<String> {
        self.run(Command::parse(line)?).await
    }

    #[instrument(skip(self))]
    pub async fn run(&self, command: Command) -> Result<String> {
        let request = match command {
            Command::Send(request) => request,
            Command::Help => return Ok(HELP.to_owned()),
            Command::Empty => return Ok(String::new()),
        };
        trace!(action = request.action(), "sending request to the namenode");
        match self.namenode.send(&request).await? {
            Response::Error { kind, message } => Err(format!("[{kind}] {message}").into()),
            response => Ok(response.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_wire_actions() {
        let cases = [
            ("mkdir / docs", "create_directory"),
            ("rmdir /docs", "delete_directory"),
            ("mv /a /b", "move_file"),
            ("upload ./a.txt /a.txt", "upload_file"),
            ("download /a.txt ./b.txt", "download_file"),
            ("ls /", "list_directory_contents"),
            ("tree /", "traverse_directory"),
            ("status", "status"),
            ("register dn-1 127.0.0.1 6001", "register"),
            ("heartbeat dn-1", "heartbeat"),
        ];
        for (line, action) in cases {
            match Command::parse(line).unwrap() {
                Command::Send(request) => assert_eq!(request.action(), action, "{line}"),
                other => panic!("{line} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn arguments_keep_their_order() {
        assert_eq!(
            Command::parse("  mv   /src/a  /dst/b ").unwrap(),
            Command::Send(Request::MoveFile {
                source_path: "/src/a".into(),
                destination_path: "/dst/b".into(),
            })
        );
    }

    #[test]
    fn quoted_paths_keep_their_spaces() {
        assert_eq!(
            Command::parse(r#"upload "/tmp/my file.txt" '/docs/year 2024/a.txt'"#).unwrap(),
            Command::Send(Request::UploadFile {
                local_path: "/tmp/my file.txt".into(),
                dfs_path: "/docs/year 2024/a.txt".into(),
            })
        );
        assert_eq!(
            Command::parse(r#"mkdir / "it's here""#).unwrap(),
            Command::Send(Request::CreateDirectory {
                parent_path: "/".into(),
                directory_name: "it's here".into(),
            })
        );
        assert_eq!(
            Command::parse("ls \"\"").unwrap(),
            Command::Send(Request::ListDirectoryContents {
                dfs_path: String::new(),
            })
        );
        assert!(Command::parse("ls \"/open").is_err());
        assert_eq!(
            Command::from_words(vec!["ls".into(), "/my docs".into()]).unwrap(),
            Command::Send(Request::ListDirectoryContents {
                dfs_path: "/my docs".into(),
            })
        );
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(Command::parse("mkdir /").is_err());
        assert!(Command::parse("status now").is_err());
        assert!(Command::parse("register dn-1 host port").is_err());
        assert!(Command::parse("format /").is_err());
        assert_eq!(Command::parse("   ").unwrap(), Command::Empty);
        assert_eq!(Command::parse("help").unwrap(), Command::Help);
    }
}
