mod client;
mod config_file;
mod forwarding;
mod host;
mod install;
