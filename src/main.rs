use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use giveback::api::types::{ContactMessage, VolunteerApplication};
use giveback::api::types::{DonationFrequency, DonationRequest};
use giveback::api::{NonprofitApi, Resource};
use giveback::config::Config;
use giveback::storage::{Session, SqliteStorage};
use giveback::{logging, ApiClient, ApiError, AppContext, Query, QueryOptions};

#[derive(Parser, Debug)]
#[command(name = "giveback")]
#[command(about = "Command-line client for the GiveBack volunteer and donation API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/giveback/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding config and GIVEBACK_API_URL
  #[arg(long)]
  base_url: Option<String>,

  /// Treat the network as unavailable
  #[arg(long)]
  offline: bool,

  /// Print results as JSON
  #[arg(long)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Log in (password is read from GIVEBACK_PASSWORD)
  Login { email: String },
  /// Create an account (password is read from GIVEBACK_PASSWORD)
  Register { name: String, email: String },
  /// Forget the stored session
  Logout,
  /// Show the logged-in user
  Whoami,
  /// List volunteers
  Volunteers {
    #[arg(long)]
    refresh: bool,
  },
  /// Sign up as a volunteer
  Volunteer {
    name: String,
    email: String,
    #[arg(long)]
    phone: Option<String>,
    /// Area of interest (repeatable)
    #[arg(long = "interest")]
    interests: Vec<String>,
    #[arg(long)]
    availability: Option<String>,
    #[arg(long)]
    message: Option<String>,
  },
  /// List donations
  Donations {
    #[arg(long)]
    refresh: bool,
  },
  /// Record a donation
  Donate {
    amount: f64,
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long, default_value = "USD")]
    currency: String,
    #[arg(long, value_enum, default_value_t = Frequency::OneTime)]
    frequency: Frequency,
    #[arg(long)]
    message: Option<String>,
    #[arg(long)]
    anonymous: bool,
  },
  /// Send a message to the organization
  Contact {
    name: String,
    email: String,
    subject: String,
    message: String,
  },
  /// Show impact statistics
  Impact {
    #[arg(long)]
    refresh: bool,
  },
  /// List stories
  Stories {
    #[arg(long)]
    refresh: bool,
  },
  /// Show an about page section (e.g. mission, team)
  About {
    section: String,
    #[arg(long)]
    refresh: bool,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Frequency {
  OneTime,
  Monthly,
  Yearly,
}

impl From<Frequency> for DonationFrequency {
  fn from(frequency: Frequency) -> Self {
    match frequency {
      Frequency::OneTime => DonationFrequency::OneTime,
      Frequency::Monthly => DonationFrequency::Monthly,
      Frequency::Yearly => DonationFrequency::Yearly,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = match logging::init() {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: logging disabled: {}", e);
      None
    }
  };

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = &args.base_url {
    config.api.base_url = url.clone();
    config.validate()?;
  }

  let context = AppContext::from_config(&config.cache);
  context.network().set_online(!args.offline);
  context.start();

  let session = Session::new(Arc::new(SqliteStorage::open()?));
  let client = ApiClient::new(&config.api, session)
    .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
  let api = NonprofitApi::new(client);

  let result = run(&args, &api, &context).await;

  for notification in context.notifier().recent() {
    eprintln!("[{}] {}", notification.kind, notification.message);
  }
  context.shutdown();

  result
}

async fn run(args: &Args, api: &NonprofitApi, context: &AppContext) -> Result<()> {
  let json = args.json;

  match &args.command {
    Command::Login { email } => {
      let password = Config::get_password()?;
      let user = api.login(email, &password).await.map_err(|e| eyre!("Login failed: {}", e))?;
      print(json, &user, |u| println!("Logged in as {} <{}>", u.name, u.email))
    }
    Command::Register { name, email } => {
      let password = Config::get_password()?;
      let user = api
        .register(name, email, &password)
        .await
        .map_err(|e| eyre!("Registration failed: {}", e))?;
      print(json, &user, |u| println!("Registered {} <{}>", u.name, u.email))
    }
    Command::Logout => {
      api.logout().map_err(|e| eyre!("{}", e))?;
      if !json {
        println!("Logged out");
      }
      Ok(())
    }
    Command::Whoami => {
      // Offline, the user stored at login is the best we have
      let user = if context.is_online() {
        api.me().await.map_err(|e| eyre!("Could not fetch current user: {}", e))?
      } else {
        api
          .cached_user()
          .ok_or_else(|| eyre!("Not logged in"))?
      };
      print(json, &user, |u| {
        let role = u.role.as_deref().unwrap_or("member");
        println!("{} <{}> ({})", u.name, u.email, role)
      })
    }
    Command::Volunteers { refresh } => {
      let api = api.clone();
      let volunteers = fetch(context, Resource::Volunteers, *refresh, move || {
        let api = api.clone();
        async move { api.volunteers().await }
      })
      .await?;
      print(json, &volunteers, |list| {
        for v in list {
          let status = v.status.as_deref().unwrap_or("-");
          println!("{:<24} {:<32} {}", v.name, v.email, status);
        }
      })
    }
    Command::Volunteer {
      name,
      email,
      phone,
      interests,
      availability,
      message,
    } => {
      let application = VolunteerApplication {
        name: name.clone(),
        email: email.clone(),
        phone: phone.clone(),
        interests: interests.clone(),
        availability: availability.clone(),
        message: message.clone(),
      };
      let volunteer = api
        .register_volunteer(&application)
        .await
        .map_err(|e| eyre!("Volunteer sign-up failed: {}", e))?;
      print(json, &volunteer, |v| println!("Signed up {} <{}>", v.name, v.email))
    }
    Command::Donations { refresh } => {
      let api = api.clone();
      let donations = fetch(context, Resource::Donations, *refresh, move || {
        let api = api.clone();
        async move { api.donations().await }
      })
      .await?;
      print(json, &donations, |list| {
        for d in list {
          let donor = d.donor_name.as_deref().unwrap_or("anonymous");
          println!("{:>10.2} {:<4} {:<24} {:?}", d.amount, d.currency, donor, d.frequency);
        }
      })
    }
    Command::Donate {
      amount,
      name,
      email,
      currency,
      frequency,
      message,
      anonymous,
    } => {
      if *amount <= 0.0 {
        return Err(eyre!("Donation amount must be positive"));
      }
      let request = DonationRequest {
        amount: *amount,
        currency: currency.clone(),
        frequency: (*frequency).into(),
        donor_name: name.clone(),
        donor_email: email.clone(),
        message: message.clone(),
        anonymous: *anonymous,
      };
      let donation = api
        .create_donation(&request)
        .await
        .map_err(|e| eyre!("Donation failed: {}", e))?;
      print(json, &donation, |d| {
        println!("Recorded donation {} of {:.2} {}", d.id, d.amount, d.currency)
      })
    }
    Command::Contact {
      name,
      email,
      subject,
      message,
    } => {
      let contact = ContactMessage {
        name: name.clone(),
        email: email.clone(),
        subject: subject.clone(),
        message: message.clone(),
      };
      let receipt = api
        .send_contact(&contact)
        .await
        .map_err(|e| eyre!("Sending message failed: {}", e))?;
      if json {
        println!("{}", serde_json::json!({ "success": receipt.success, "message": receipt.message }));
      } else {
        println!("{}", receipt.message.as_deref().unwrap_or("Message sent"));
      }
      Ok(())
    }
    Command::Impact { refresh } => {
      let api = api.clone();
      let stats = fetch(context, Resource::Impact, *refresh, move || {
        let api = api.clone();
        async move { api.impact().await }
      })
      .await?;
      print(json, &stats, |s| {
        println!("Volunteers:    {}", s.volunteers);
        println!("Donations:     {:.2}", s.donations_total);
        println!("Projects:      {}", s.projects);
        println!("People helped: {}", s.people_helped);
        for (name, value) in &s.extra {
          println!("{}: {}", name, value);
        }
      })
    }
    Command::Stories { refresh } => {
      let api = api.clone();
      let stories = fetch(context, Resource::Stories, *refresh, move || {
        let api = api.clone();
        async move { api.stories().await }
      })
      .await?;
      print(json, &stories, |list| {
        for s in list {
          println!("{}", s.title);
          if let Some(summary) = &s.summary {
            println!("  {}", summary);
          }
        }
      })
    }
    Command::About { section, refresh } => {
      let api = api.clone();
      let name = section.clone();
      let resource = Resource::About {
        section: section.clone(),
      };
      let content = fetch(context, resource, *refresh, move || {
        let api = api.clone();
        let name = name.clone();
        async move { api.about(&name).await }
      })
      .await?;
      // About content is free-form, so it is always shown as JSON
      println!("{}", serde_json::to_string_pretty(&content)?);
      Ok(())
    }
  }
}

/// Run a read through a cached query and return its data.
async fn fetch<T, F, Fut>(
  context: &AppContext,
  resource: Resource,
  refresh: bool,
  fetcher: F,
) -> Result<T>
where
  T: Clone + Serialize + DeserializeOwned + Send + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
  // ApiClient already retries each request
  let options = QueryOptions::default()
    .cache_key(resource.cache_key())
    .retries(0);
  let mut query = Query::new(context.clone(), options, fetcher);
  if refresh {
    query.refresh();
  } else {
    query.execute();
  }

  let state = query.settle().await;
  if let Some(error) = &state.error {
    return Err(eyre!("Failed to load {}: {}", resource.description(), error));
  }
  state
    .data
    .clone()
    .ok_or_else(|| eyre!("No {} returned", resource.description()))
}

fn print<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
  if json {
    let out = serde_json::to_string_pretty(value)
      .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
    println!("{}", out);
  } else {
    human(value);
  }
  Ok(())
}
