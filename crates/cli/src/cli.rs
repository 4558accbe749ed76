use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use roundtable_protocol::SiteId;

#[derive(Parser, Debug)]
#[command(name = "roundtable")]
#[command(about = "Send one prompt to many browser chat tabs and collect the answers")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (default: ~/.config/roundtable/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the agent host: attach to chat tabs and serve controllers
	Serve(ServeArgs),

	/// Pair this machine with a running host
	///
	/// Without CODE, asks the host to issue a pairing code (printed by the
	/// host). With CODE, confirms it and stores the token.
	Pair {
		code: Option<String>,
		#[command(flatten)]
		conn: ConnArgs,
	},

	/// Send a message to one site
	Send {
		site: SiteId,
		/// Message text
		#[arg(required = true, num_args = 1..)]
		text: Vec<String>,
		#[command(flatten)]
		conn: ConnArgs,
	},

	/// Show which sites have a connected tab
	Status {
		#[command(flatten)]
		conn: ConnArgs,
	},

	/// Print the latest response of a site
	Response {
		site: SiteId,
		#[command(flatten)]
		conn: ConnArgs,
	},

	/// Start new conversations on the given sites
	New {
		#[arg(required = true, num_args = 1..)]
		sites: Vec<SiteId>,
		#[command(flatten)]
		conn: ConnArgs,
	},

	/// Print the merged host configuration
	Config,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
	/// Listen address for the controller websocket
	#[arg(long)]
	pub host: Option<String>,

	/// Listen port for the controller websocket
	#[arg(long)]
	pub port: Option<u16>,

	/// Chrome DevTools HTTP endpoint
	#[arg(long, value_name = "URL")]
	pub cdp: Option<String>,

	/// JSON file of site tables overriding the built-in ones
	#[arg(long, value_name = "FILE")]
	pub sites: Option<PathBuf>,

	/// Also serve a trusted controller channel on stdin/stdout (NDJSON)
	#[arg(long)]
	pub stdio: bool,
}

#[derive(Args, Debug, Default)]
pub struct ConnArgs {
	/// Controller websocket URL (default: from config)
	#[arg(long, value_name = "URL")]
	pub url: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn send_joins_words_into_one_message() {
		let cli = Cli::try_parse_from(["roundtable", "send", "claude", "hello", "there"]).unwrap();
		let Commands::Send { site, text, .. } = cli.command else {
			panic!("expected send");
		};
		assert_eq!(site, SiteId::Claude);
		assert_eq!(text.join(" "), "hello there");
	}

	#[test]
	fn new_takes_several_sites() {
		let cli = Cli::try_parse_from(["roundtable", "-vv", "new", "kimi", "gemini"]).unwrap();
		assert_eq!(cli.verbose, 2);
		let Commands::New { sites, .. } = cli.command else {
			panic!("expected new");
		};
		assert_eq!(sites, vec![SiteId::Kimi, SiteId::Gemini]);
	}

	#[test]
	fn unknown_site_is_rejected() {
		assert!(Cli::try_parse_from(["roundtable", "response", "bard"]).is_err());
	}

	#[test]
	fn serve_flags_are_optional() {
		let cli = Cli::try_parse_from(["roundtable", "serve", "--port", "4000", "--stdio"]).unwrap();
		let Commands::Serve(args) = cli.command else {
			panic!("expected serve");
		};
		assert_eq!(args.port, Some(4000));
		assert!(args.stdio);
		assert!(args.host.is_none());
	}
}
