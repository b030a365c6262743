// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

mod cli_commands;

use std::ffi::OsStr;
use std::io::stdout;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use clap::builder::TypedValueParser;
use clap::builder::styling::Styles;
use clap::{Arg, Args, Command, CommandFactory, Parser, crate_description, crate_version};
use clap_complete::{Shell, generate};
use color_eyre::config::HookBuilder;
use color_eyre::eyre::{EyreHandler, InstallError, Result};
use dmemdap::DmemParams;
use owo_colors::OwoColorize;

use crate::cli_commands::ToplevelCommmands;
use crate::cli_commands::dap::info_command;

#[derive(Parser)]
#[command(
	version,
	about = format!("{} v{}", crate_description!(), crate_version!()),
	styles(style()),
	disable_colored_help(false),
	arg_required_else_help(true)
)]
struct CliArguments
{
	#[arg(global = true, short = 'd', long = "device")]
	/// Use the dmem device at the given path (defaults to /dev/mem)
	device: Option<PathBuf>,
	#[arg(global = true, long = "base-address", value_parser = NumberParser::<u64>::new())]
	/// Bus address of the CoreSight ROM table
	base_address: Option<u64>,
	#[arg(global = true, long = "max-aps", value_parser = NumberParser::<u8>::new())]
	/// Number of access ports to model
	max_aps: Option<u8>,
	#[arg(global = true, long = "ap-address-offset", value_parser = NumberParser::<u32>::new())]
	/// Address stride between consecutive access ports
	ap_address_offset: Option<u32>,
	#[arg(global = true, long = "idcode", value_parser = NumberParser::<u32>::new())]
	/// Value the debug port's DPIDR should read as
	idcode: Option<u32>,
	#[arg(global = true, long = "poll-limit", value_parser = NumberParser::<NonZeroU32>::new())]
	/// Give up on a CoreSight access after this many polls instead of waiting forever
	poll_limit: Option<NonZeroU32>,

	#[command(subcommand)]
	pub subcommand: ToplevelCommmands,
}

impl DmemParams for CliArguments
{
	fn device(&self) -> Option<&Path>
	{
		self.device.as_deref()
	}

	fn base_address(&self) -> Option<u64>
	{
		self.base_address
	}

	fn max_aps(&self) -> Option<u8>
	{
		self.max_aps
	}

	fn ap_address_offset(&self) -> Option<u32>
	{
		self.ap_address_offset
	}

	fn idcode(&self) -> Option<u32>
	{
		self.idcode
	}

	fn poll_limit(&self) -> Option<NonZeroU32>
	{
		self.poll_limit
	}
}

#[derive(Args)]
struct CompletionArguments
{
	shell: Shell,
}

/// Integer types that can be parsed from either decimal or `0x` prefixed hexadecimal
pub trait ParseNumber: Sized
{
	fn parse_number(value: &str) -> Option<Self>;
}

macro_rules! parse_number_impl
{
	($($type:ty),*) => {
		$(
			impl ParseNumber for $type
			{
				fn parse_number(value: &str) -> Option<Self>
				{
					match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
						Some(hex) => <$type>::from_str_radix(&hex.replace('_', ""), 16).ok(),
						None => value.replace('_', "").parse().ok(),
					}
				}
			}
		)*
	};
}

parse_number_impl!(u8, u32, u64);

impl ParseNumber for NonZeroU32
{
	fn parse_number(value: &str) -> Option<Self>
	{
		u32::parse_number(value).and_then(NonZeroU32::new)
	}
}

#[derive(Clone)]
pub struct NumberParser<T>(std::marker::PhantomData<T>);

impl<T> NumberParser<T>
{
	pub fn new() -> Self
	{
		Self(std::marker::PhantomData)
	}
}

impl<T> TypedValueParser for NumberParser<T>
where
	T: ParseNumber + Clone + Send + Sync + 'static,
{
	type Value = T;

	fn parse_ref(&self, cmd: &Command, _arg: Option<&Arg>, value: &OsStr) -> Result<Self::Value, clap::Error>
	{
		let value = value
			.to_str()
			.ok_or_else(|| clap::Error::new(clap::error::ErrorKind::InvalidUtf8).with_cmd(cmd))?;
		T::parse_number(value).ok_or_else(|| clap::Error::new(clap::error::ErrorKind::InvalidValue).with_cmd(cmd))
	}
}

type EyreHookFunc = Box<dyn Fn(&(dyn std::error::Error + 'static)) -> Box<dyn EyreHandler> + Send + Sync + 'static>;
type PanicHookFunc = Box<dyn Fn(&std::panic::PanicHookInfo<'_>) + Send + Sync + 'static>;

struct DmemdapHook
{
	inner_hook: EyreHookFunc,
}

struct DmemdapPanic
{
	inner_hook: PanicHookFunc,
}

struct DmemdapHandler
{
	inner_handler: Box<dyn EyreHandler>,
}

impl DmemdapHook
{
	fn build_handler(&self, error: &(dyn std::error::Error + 'static)) -> DmemdapHandler
	{
		DmemdapHandler {
			inner_handler: (*self.inner_hook)(error),
		}
	}

	pub fn install(self) -> Result<(), InstallError>
	{
		color_eyre::eyre::set_hook(self.into_eyre_hook())
	}

	pub fn into_eyre_hook(self) -> EyreHookFunc
	{
		Box::new(move |err| Box::new(self.build_handler(err)))
	}
}

impl DmemdapPanic
{
	pub fn install(self)
	{
		std::panic::set_hook(self.into_panic_hook());
	}

	pub fn into_panic_hook(self) -> PanicHookFunc
	{
		Box::new(move |panic_info| {
			self.print_header();
			(*self.inner_hook)(panic_info);
			self.print_footer();
		})
	}

	fn print_header(&self)
	{
		eprintln!("------------[ ✂ cut here ✂ ]------------");
		eprintln!("Unhandled crash in dmemdap-cli v{}", crate_version!());
		eprintln!();
	}

	fn print_footer(&self)
	{
		eprintln!();
		eprintln!("{}", "Please include all lines down to this one from the cut here".yellow());
		eprintln!("{}", "marker when reporting this issue".yellow());
	}
}

impl EyreHandler for DmemdapHandler
{
	fn debug(&self, error: &(dyn std::error::Error + 'static), fmt: &mut core::fmt::Formatter<'_>)
	-> core::fmt::Result
	{
		writeln!(fmt, "------------[ ✂ cut here ✂ ]------------")?;
		write!(fmt, "Unhandled error in dmemdap-cli v{}", crate_version!())?;
		self.inner_handler.debug(error, fmt)?;
		writeln!(fmt)?;
		writeln!(fmt)?;
		writeln!(
			fmt,
			"{}",
			"Please include all lines down to this one from the cut here".yellow()
		)?;
		write!(fmt, "{}", " marker when reporting this issue".yellow())
	}

	fn track_caller(&mut self, location: &'static std::panic::Location<'static>)
	{
		self.inner_handler.track_caller(location);
	}
}

fn install_error_handler() -> Result<()>
{
	// Grab us a new default handler
	let default_handler = HookBuilder::default();
	// Turn that into a pair of hooks - one for panic, and the other for errors
	let (panic_hook, eyre_hook) = default_handler.try_into_hooks()?;

	// Wrap the default panic hook so we only have to deal with our additions
	DmemdapPanic {
		inner_hook: panic_hook.into_panic_hook(),
	}
	.install();

	// Same for the error hook
	DmemdapHook {
		inner_hook: eyre_hook.into_eyre_hook(),
	}
	.install()?;
	Ok(())
}

/// Clap v3 style (approximate)
/// See https://stackoverflow.com/a/75343828
fn style() -> clap::builder::Styles
{
	Styles::styled()
		.usage(
			anstyle::Style::new()
				.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)))
				.bold(),
		)
		.header(
			anstyle::Style::new()
				.bold()
				.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
		)
		.literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
}

fn main() -> Result<()>
{
	install_error_handler()?;
	env_logger::Builder::new()
		.filter_level(log::LevelFilter::Info)
		.parse_default_env()
		.init();

	let cli_args = CliArguments::parse();

	match &cli_args.subcommand {
		ToplevelCommmands::Complete(comp_args) => {
			let mut cmd = CliArguments::command();
			generate(comp_args.shell, &mut cmd, "dmemdap-cli", &mut stdout());
			Ok(())
		},
		ToplevelCommmands::Info => info_command(&cli_args),
		ToplevelCommmands::Read(read_args) => read_args.run(&cli_args),
		ToplevelCommmands::Write(write_args) => write_args.run(&cli_args),
	}
}
