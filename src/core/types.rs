use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionType {
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

impl ProvisionType {
    pub const ALL: [ProvisionType; 12] = [
        ProvisionType::RetirementAnnuity,
        ProvisionType::PensionFund,
        ProvisionType::ProvidentFund,
        ProvisionType::PreservationFund,
        ProvisionType::Business,
        ProvisionType::Endowment,
        ProvisionType::SavingsFund,
        ProvisionType::Shares,
        ProvisionType::LinkedInvestment,
        ProvisionType::Property,
        ProvisionType::FixedDeposit,
        ProvisionType::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProvisionType::RetirementAnnuity => "Retirement Annuity",
            ProvisionType::PensionFund => "Pension Fund",
            ProvisionType::ProvidentFund => "Provident Fund",
            ProvisionType::PreservationFund => "Preservation Fund",
            ProvisionType::Business => "Business",
            ProvisionType::Endowment => "Endowment",
            ProvisionType::SavingsFund => "Savings Fund",
            ProvisionType::Shares => "Shares",
            ProvisionType::LinkedInvestment => "Linked Investment",
            ProvisionType::Property => "Property",
            ProvisionType::FixedDeposit => "Fixed Deposit",
            ProvisionType::Other => "Other",
        }
    }
}

/// An existing savings vehicle. Rates are fractions, amounts are currency.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Provision {
    pub provision_type: ProvisionType,
    pub current_value: f64,
    pub annual_return: f64,
    /// Contribution per month during the first projected year.
    pub monthly_contribution: f64,
    pub contribution_increase: f64,
}

/// Validated plan inputs. All rates are fractions in `[0, 0.20]` and
/// `retirement_age > current_age`; the engine assumes both.
#[derive(Debug, Clone)]
pub struct RetirementPlanInputs {
    pub desired_monthly_income: f64,
    pub annual_income_increase: f64,
    pub current_age: u32,
    pub retirement_age: u32,
    pub inflation_rate: f64,
    pub assumed_return: f64,
    pub preserve_capital: bool,
    /// Zero unless `preserve_capital` is set.
    pub preservation_years: u32,
    pub provisions: Vec<Provision>,
}

impl RetirementPlanInputs {
    pub fn years_to_retirement(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionProjection {
    pub provision_type: ProvisionType,
    pub label: &'static str,
    pub current_value: f64,
    pub annual_return: f64,
    pub monthly_contribution: f64,
    pub contribution_increase: f64,
    pub future_value: f64,
}

impl ProvisionProjection {
    pub fn new(provision: &Provision, future_value: f64) -> Self {
        Self {
            provision_type: provision.provision_type,
            label: provision.provision_type.label(),
            current_value: provision.current_value,
            annual_return: provision.annual_return,
            monthly_contribution: provision.monthly_contribution,
            contribution_increase: provision.contribution_increase,
            future_value,
        }
    }
}

/// One retirement year of a drawdown. `capital` is the balance at the start
/// of the year, before `withdrawal` is taken.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepletionYear {
    pub year: u32,
    pub capital: f64,
    pub withdrawal: f64,
    pub monthly_income: f64,
    pub monthly_income_real: f64,
}

impl DepletionYear {
    pub(crate) fn terminal(year: u32) -> Self {
        Self {
            year,
            capital: 0.0,
            withdrawal: 0.0,
            monthly_income: 0.0,
            monthly_income_real: 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DepletionOutcome {
    Depleted {
        years: u32,
    },
    /// Capital was still above the small-balance threshold after the
    /// simulation horizon.
    Sustained {
        #[serde(rename = "horizonYears")]
        horizon_years: u32,
        #[serde(rename = "remainingCapital")]
        remaining_capital: f64,
    },
}

impl DepletionOutcome {
    pub fn years_until_depletion(self) -> Option<u32> {
        match self {
            DepletionOutcome::Depleted { years } => Some(years),
            DepletionOutcome::Sustained { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepletionSimulation {
    pub outcome: DepletionOutcome,
    pub first_withdrawal: f64,
    pub series: Vec<DepletionYear>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalGap {
    pub shortfall: f64,
    pub capital_excess: f64,
    pub additional_monthly_savings: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalPlan {
    pub preservation_years: u32,
    /// `None` when preservation is impossible at a non-positive return.
    pub capital_required: Option<f64>,
    pub gap: Option<CapitalGap>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawdownPlan {
    pub capital_at_retirement: f64,
    pub years_until_depletion: Option<u32>,
    pub depletion: DepletionSimulation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PlanStrategy {
    PreserveCapital(CapitalPlan),
    Drawdown(DrawdownPlan),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementPlanResult {
    pub current_age: u32,
    pub retirement_age: u32,
    pub years_to_retirement: u32,
    pub desired_monthly_income: f64,
    pub future_annual_income: f64,
    pub future_monthly_income: f64,
    pub provisions: Vec<ProvisionProjection>,
    pub total_provision_value: f64,
    pub blended_return: f64,
    pub initial_withdrawal_annual: f64,
    pub initial_withdrawal_monthly: f64,
    pub strategy: PlanStrategy,
}
