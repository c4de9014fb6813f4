mod error;

use axum::{
    Router,
    extract::{Json, Query, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use error::{CommandError, InputError};

use crate::core::policy::{MAX_RATE, PRESERVATION_PERIODS};
use crate::core::{
    PlanStrategy, Provision, ProvisionType, RetirementPlanInputs, RetirementPlanResult, run_plan,
};

const MIN_CURRENT_AGE: u32 = 18;
const MAX_CURRENT_AGE: u32 = 100;
const MAX_RETIREMENT_AGE: u32 = 100;
const MAX_PROVISIONS: usize = 10;
const DEFAULT_PROVISION_RETURN: f64 = 7.0;
const DEFAULT_CONTRIBUTION_INCREASE: f64 = 5.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliProvisionType {
    RetirementAnnuity,
    PensionFund,
    ProvidentFund,
    PreservationFund,
    Business,
    Endowment,
    SavingsFund,
    Shares,
    LinkedInvestment,
    Property,
    FixedDeposit,
    Other,
}

impl From<CliProvisionType> for ProvisionType {
    fn from(value: CliProvisionType) -> Self {
        match value {
            CliProvisionType::RetirementAnnuity => ProvisionType::RetirementAnnuity,
            CliProvisionType::PensionFund => ProvisionType::PensionFund,
            CliProvisionType::ProvidentFund => ProvisionType::ProvidentFund,
            CliProvisionType::PreservationFund => ProvisionType::PreservationFund,
            CliProvisionType::Business => ProvisionType::Business,
            CliProvisionType::Endowment => ProvisionType::Endowment,
            CliProvisionType::SavingsFund => ProvisionType::SavingsFund,
            CliProvisionType::Shares => ProvisionType::Shares,
            CliProvisionType::LinkedInvestment => ProvisionType::LinkedInvestment,
            CliProvisionType::Property => ProvisionType::Property,
            CliProvisionType::FixedDeposit => ProvisionType::FixedDeposit,
            CliProvisionType::Other => ProvisionType::Other,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiProvisionType {
    #[serde(alias = "retirementAnnuity", alias = "retirement_annuity", alias = "Retirement Annuity")]
    RetirementAnnuity,
    #[serde(alias = "pensionFund", alias = "pension_fund", alias = "Pension Fund")]
    PensionFund,
    #[serde(alias = "providentFund", alias = "provident_fund", alias = "Provident Fund")]
    ProvidentFund,
    #[serde(alias = "preservationFund", alias = "preservation_fund", alias = "Preservation Fund")]
    PreservationFund,
    #[serde(alias = "Business")]
    Business,
    #[serde(alias = "Endowment")]
    Endowment,
    #[serde(alias = "savingsFund", alias = "savings_fund", alias = "Savings Fund")]
    SavingsFund,
    #[serde(alias = "Shares")]
    Shares,
    #[serde(alias = "linkedInvestment", alias = "linked_investment", alias = "Linked Investment")]
    LinkedInvestment,
    #[serde(alias = "Property")]
    Property,
    #[serde(alias = "fixedDeposit", alias = "fixed_deposit", alias = "Fixed Deposit")]
    FixedDeposit,
    #[serde(alias = "Other")]
    Other,
}

impl From<ApiProvisionType> for CliProvisionType {
    fn from(value: ApiProvisionType) -> Self {
        match value {
            ApiProvisionType::RetirementAnnuity => CliProvisionType::RetirementAnnuity,
            ApiProvisionType::PensionFund => CliProvisionType::PensionFund,
            ApiProvisionType::ProvidentFund => CliProvisionType::ProvidentFund,
            ApiProvisionType::PreservationFund => CliProvisionType::PreservationFund,
            ApiProvisionType::Business => CliProvisionType::Business,
            ApiProvisionType::Endowment => CliProvisionType::Endowment,
            ApiProvisionType::SavingsFund => CliProvisionType::SavingsFund,
            ApiProvisionType::Shares => CliProvisionType::Shares,
            ApiProvisionType::LinkedInvestment => CliProvisionType::LinkedInvestment,
            ApiProvisionType::Property => CliProvisionType::Property,
            ApiProvisionType::FixedDeposit => CliProvisionType::FixedDeposit,
            ApiProvisionType::Other => CliProvisionType::Other,
        }
    }
}

/// A provision as given on the command line, rates in percent.
#[derive(Copy, Clone, Debug, PartialEq)]
struct ProvisionArg {
    provision_type: CliProvisionType,
    current_value: f64,
    annual_return: f64,
    monthly_contribution: f64,
    contribution_increase: f64,
}

impl FromStr for ProvisionArg {
    type Err = InputError;

    /// Parses `TYPE[:VALUE[:RETURN[:MONTHLY[:INCREASE]]]]`, e.g.
    /// `pension-fund:500000:8:5000:5`. Omitted fields take form defaults.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: String| InputError::MalformedProvision {
            spec: spec.to_string(),
            reason,
        };

        let mut parts = spec.split(':').map(str::trim);
        let type_name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("missing provision type".to_string()))?;
        let normalized = type_name.replace([' ', '_'], "-");
        let provision_type = <CliProvisionType as ValueEnum>::from_str(&normalized, true)
            .map_err(|_| malformed(format!("unknown provision type `{type_name}`")))?;

        let mut number = |name: &str, default: f64| match parts.next() {
            None | Some("") => Ok(default),
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| malformed(format!("{name} `{raw}` is not a number"))),
        };
        let current_value = number("current value", 0.0)?;
        let annual_return = number("annual return", DEFAULT_PROVISION_RETURN)?;
        let monthly_contribution = number("monthly contribution", 0.0)?;
        let contribution_increase =
            number("contribution increase", DEFAULT_CONTRIBUTION_INCREASE)?;

        if parts.next().is_some() {
            return Err(malformed("expected at most five fields".to_string()));
        }

        Ok(Self {
            provision_type,
            current_value,
            annual_return,
            monthly_contribution,
            contribution_increase,
        })
    }
}

impl From<ProvisionPayload> for ProvisionArg {
    fn from(payload: ProvisionPayload) -> Self {
        Self {
            provision_type: payload
                .provision_type
                .map(CliProvisionType::from)
                .unwrap_or(CliProvisionType::Other),
            current_value: payload.current_value.unwrap_or(0.0),
            annual_return: payload.annual_return.unwrap_or(DEFAULT_PROVISION_RETURN),
            monthly_contribution: payload.monthly_contribution.unwrap_or(0.0),
            contribution_increase: payload
                .contribution_increase
                .unwrap_or(DEFAULT_CONTRIBUTION_INCREASE),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProvisionPayload {
    #[serde(rename = "type")]
    provision_type: Option<ApiProvisionType>,
    current_value: Option<f64>,
    annual_return: Option<f64>,
    monthly_contribution: Option<f64>,
    contribution_increase: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    desired_monthly_income: Option<f64>,
    annual_income_increase: Option<f64>,
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    inflation_rate: Option<f64>,
    assumed_return: Option<f64>,
    preserve_capital: Option<bool>,
    preservation_years: Option<u32>,
    provisions: Option<ProvisionsField>,
}

/// Provisions as a JSON list, or as `;`-separated specs in a query string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProvisionsField {
    List(Vec<ProvisionPayload>),
    Specs(String),
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "retire",
    about = "Retirement capital planner (provision growth, capital requirement and drawdown)"
)]
pub struct Cli {
    #[arg(long, help = "Desired monthly income at retirement in today's money")]
    desired_monthly_income: f64,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Desired annual income increase in percent"
    )]
    annual_income_increase: f64,
    #[arg(long)]
    current_age: u32,
    #[arg(long, default_value_t = 65)]
    retirement_age: u32,
    #[arg(long, default_value_t = 6.0, help = "Inflation rate in percent")]
    inflation_rate: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Assumed annual return after retirement in percent"
    )]
    assumed_return: f64,
    #[arg(long, help = "Preserve capital at retirement instead of drawing it down")]
    preserve_capital: bool,
    #[arg(
        long,
        default_value_t = 0,
        help = "Preservation period in years (10, 15, 20 or 25), used with --preserve-capital"
    )]
    preservation_years: u32,
    #[arg(
        long = "provision",
        value_name = "TYPE:VALUE[:RETURN[:MONTHLY[:INCREASE]]]",
        help = "Existing provision; return and increase in percent (defaults 7 and 5)"
    )]
    provisions: Vec<ProvisionArg>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartRow {
    age: u32,
    capital: f64,
    annual_withdrawal: f64,
    monthly_income: f64,
    monthly_income_today: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse<'a> {
    summary: &'a RetirementPlanResult,
    chart_data: Vec<ChartRow>,
}

#[derive(Debug, Serialize)]
struct ProvisionTypeResponse {
    id: ProvisionType,
    label: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn rate_fraction(field: String, percent: f64) -> Result<f64, InputError> {
    let rate = percent / 100.0;
    if (0.0..=MAX_RATE).contains(&rate) {
        Ok(rate)
    } else {
        Err(InputError::RateOutOfRange { field })
    }
}

fn non_negative(field: String, value: f64) -> Result<f64, InputError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(InputError::Negative { field })
    }
}

impl ProvisionArg {
    fn into_provision(self, index: usize) -> Result<Provision, InputError> {
        let field = |name: &str| format!("provision {index} {name}");
        Ok(Provision {
            provision_type: self.provision_type.into(),
            current_value: non_negative(field("current value"), self.current_value)?,
            annual_return: rate_fraction(field("annual return"), self.annual_return)?,
            monthly_contribution: non_negative(
                field("monthly contribution"),
                self.monthly_contribution,
            )?,
            contribution_increase: rate_fraction(
                field("contribution increase"),
                self.contribution_increase,
            )?,
        })
    }
}

fn build_inputs(cli: Cli) -> Result<RetirementPlanInputs, InputError> {
    if !cli.desired_monthly_income.is_finite() || cli.desired_monthly_income <= 0.0 {
        return Err(InputError::NotPositive {
            field: "--desired-monthly-income".to_string(),
        });
    }

    if !(MIN_CURRENT_AGE..=MAX_CURRENT_AGE).contains(&cli.current_age) {
        return Err(InputError::CurrentAge {
            min: MIN_CURRENT_AGE,
            max: MAX_CURRENT_AGE,
        });
    }

    if cli.retirement_age <= cli.current_age {
        return Err(InputError::AgeOrder);
    }

    if cli.retirement_age > MAX_RETIREMENT_AGE {
        return Err(InputError::RetirementAge {
            max: MAX_RETIREMENT_AGE,
        });
    }

    let annual_income_increase = rate_fraction(
        "--annual-income-increase".to_string(),
        cli.annual_income_increase,
    )?;
    let inflation_rate = rate_fraction("--inflation-rate".to_string(), cli.inflation_rate)?;
    let assumed_return = rate_fraction("--assumed-return".to_string(), cli.assumed_return)?;

    let preservation_years = if cli.preserve_capital {
        if !PRESERVATION_PERIODS.contains(&cli.preservation_years) {
            return Err(InputError::PreservationPeriod(cli.preservation_years));
        }
        cli.preservation_years
    } else {
        0
    };

    if cli.provisions.is_empty() {
        return Err(InputError::NoProvisions);
    }

    if cli.provisions.len() > MAX_PROVISIONS {
        return Err(InputError::TooManyProvisions {
            max: MAX_PROVISIONS,
        });
    }

    let provisions = cli
        .provisions
        .into_iter()
        .enumerate()
        .map(|(i, provision)| provision.into_provision(i + 1))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RetirementPlanInputs {
        desired_monthly_income: cli.desired_monthly_income,
        annual_income_increase,
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        inflation_rate,
        assumed_return,
        preserve_capital: cli.preserve_capital,
        preservation_years,
        provisions,
    })
}

/// Runs a single plan from parsed command-line flags and renders it as JSON.
pub fn run_plan_command(cli: Cli) -> Result<String, CommandError> {
    let inputs = build_inputs(cli)?;
    let result = run_plan(&inputs);
    Ok(serde_json::to_string_pretty(&build_plan_response(&result))?)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "retirement planner HTTP API listening");

    axum::serve(listener, router()).await
}

fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/provision-types", get(provision_types_handler))
        .route("/api/plan", get(plan_get_handler).post(plan_post_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn provision_types_handler() -> Response {
    let types: Vec<ProvisionTypeResponse> = ProvisionType::ALL
        .iter()
        .map(|&id| ProvisionTypeResponse {
            id,
            label: id.label(),
        })
        .collect();
    json_response(StatusCode::OK, types)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn plan_get_handler(query: Result<Query<PlanPayload>, QueryRejection>) -> Response {
    let request = query
        .map_err(|rejection| InputError::Query(rejection.body_text()))
        .and_then(|Query(payload)| api_request_from_payload(payload));
    plan_handler_impl(request)
}

async fn plan_post_handler(body: String) -> Response {
    plan_handler_impl(api_request_from_json(&body))
}

fn plan_handler_impl(request: Result<RetirementPlanInputs, InputError>) -> Response {
    let inputs = match request {
        Ok(inputs) => inputs,
        Err(err) => {
            warn!(error = %err, "rejected plan request");
            return err.into_response();
        }
    };

    let result = run_plan(&inputs);
    info!(
        preserve_capital = inputs.preserve_capital,
        years_to_retirement = result.years_to_retirement,
        provisions = inputs.provisions.len(),
        "computed retirement plan"
    );
    json_response(StatusCode::OK, build_plan_response(&result))
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn api_request_from_json(json: &str) -> Result<RetirementPlanInputs, InputError> {
    let payload = serde_json::from_str::<PlanPayload>(json)
        .map_err(|e| InputError::Json(e.to_string()))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: PlanPayload) -> Result<RetirementPlanInputs, InputError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.desired_monthly_income {
        cli.desired_monthly_income = v;
    }
    if let Some(v) = payload.annual_income_increase {
        cli.annual_income_increase = v;
    }
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.assumed_return {
        cli.assumed_return = v;
    }
    if let Some(v) = payload.preserve_capital {
        cli.preserve_capital = v;
    }
    if let Some(v) = payload.preservation_years {
        cli.preservation_years = v;
    }
    match payload.provisions {
        Some(ProvisionsField::List(list)) => {
            cli.provisions
                .extend(list.into_iter().map(ProvisionArg::from));
        }
        Some(ProvisionsField::Specs(specs)) => {
            for spec in specs.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                cli.provisions.push(spec.parse()?);
            }
        }
        None => {}
    }

    build_inputs(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        desired_monthly_income: 30_000.0,
        annual_income_increase: 3.0,
        current_age: 40,
        retirement_age: 65,
        inflation_rate: 6.0,
        assumed_return: 7.0,
        preserve_capital: false,
        preservation_years: 0,
        provisions: Vec::new(),
    }
}

fn build_plan_response(result: &RetirementPlanResult) -> PlanResponse<'_> {
    let chart_data = match &result.strategy {
        PlanStrategy::Drawdown(plan) => plan
            .depletion
            .series
            .iter()
            .map(|year| ChartRow {
                age: result.retirement_age + year.year,
                capital: year.capital,
                annual_withdrawal: year.withdrawal,
                monthly_income: year.monthly_income,
                monthly_income_today: year.monthly_income_real,
            })
            .collect(),
        PlanStrategy::PreserveCapital(_) => Vec::new(),
    };

    PlanResponse {
        summary: result,
        chart_data,
    }
}
