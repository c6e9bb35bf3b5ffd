use std::path::PathBuf;

error_chain! {
    errors {
        InvalidArgument(reason: String) {
            description("Invalid argument.")
            display("invalid argument: {}", reason)
        }

        AlreadyRunning(path: PathBuf) {
            description("Pidfile already exists. Is another instance running?")
            display("pidfile {} already exists. Is another instance running?", path.display())
        }

        Io(path: PathBuf, action: String) {
            description("I/O on pidfile failed.")
            display("could not {} {}", action, path.display())
        }

        MalformedContent(path: PathBuf, reason: String) {
            description("Pidfile content is malformed.")
            display("{}: {}", path.display(), reason)
        }

        PidMismatch(path: PathBuf, expected: u32, found: u32) {
            description("Pidfile belongs to another process.")
            display("{}: expecting {}, found {}", path.display(), expected, found)
        }
    }
}
