use chargeguard_core_types::{CardBrand, ReasonCategory};

use chargeguard_core_types::ReasonCategory::{Authorization, ConsumerDispute, Fraud, ProcessingError};

/// Card network whose reason-code taxonomy a code belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkFamily {
    Visa,
    Mastercard,
    Amex,
    Discover,
}

impl NetworkFamily {
    pub const ALL: [NetworkFamily; 4] = [
        NetworkFamily::Visa,
        NetworkFamily::Mastercard,
        NetworkFamily::Amex,
        NetworkFamily::Discover,
    ];

    pub fn from_brand(brand: CardBrand) -> Option<Self> {
        match brand {
            CardBrand::Visa => Some(NetworkFamily::Visa),
            CardBrand::Mastercard => Some(NetworkFamily::Mastercard),
            CardBrand::Amex => Some(NetworkFamily::Amex),
            CardBrand::Discover => Some(NetworkFamily::Discover),
            CardBrand::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkFamily::Visa => "visa",
            NetworkFamily::Mastercard => "mastercard",
            NetworkFamily::Amex => "amex",
            NetworkFamily::Discover => "discover",
        }
    }

    pub fn table(&self) -> &'static [(&'static str, ReasonCategory, &'static str)] {
        match self {
            NetworkFamily::Visa => VISA,
            NetworkFamily::Mastercard => MASTERCARD,
            NetworkFamily::Amex => AMEX,
            NetworkFamily::Discover => DISCOVER,
        }
    }

    /// Exact, case-insensitive lookup in this network's table.
    pub fn lookup(&self, code: &str) -> Option<(ReasonCategory, &'static str)> {
        self.table()
            .iter()
            .find(|(known, _, _)| known.eq_ignore_ascii_case(code))
            .map(|(_, category, description)| (*category, *description))
    }
}

static VISA: &[(&str, ReasonCategory, &str)] = &[
    ("10.1", Fraud, "EMV Liability Shift Counterfeit Fraud"),
    ("10.2", Fraud, "EMV Liability Shift Non-Counterfeit Fraud"),
    ("10.3", Fraud, "Other Fraud - Card-Present Environment"),
    ("10.4", Fraud, "Other Fraud - Card-Absent Environment"),
    ("10.5", Fraud, "Visa Fraud Monitoring Program"),
    ("11.1", Authorization, "Card Recovery Bulletin"),
    ("11.2", Authorization, "Declined Authorization"),
    ("11.3", Authorization, "No Authorization"),
    ("12.1", ProcessingError, "Late Presentment"),
    ("12.2", ProcessingError, "Incorrect Transaction Code"),
    ("12.3", ProcessingError, "Incorrect Currency"),
    ("12.4", ProcessingError, "Incorrect Account Number"),
    ("12.5", ProcessingError, "Incorrect Amount"),
    ("12.6.1", ProcessingError, "Duplicate Processing"),
    ("12.6.2", ProcessingError, "Paid by Other Means"),
    ("12.7", ProcessingError, "Invalid Data"),
    ("13.1", ConsumerDispute, "Merchandise/Services Not Received"),
    ("13.2", ConsumerDispute, "Cancelled Recurring Transaction"),
    ("13.3", ConsumerDispute, "Not as Described or Defective Merchandise/Services"),
    ("13.4", ConsumerDispute, "Counterfeit Merchandise"),
    ("13.5", ConsumerDispute, "Misrepresentation"),
    ("13.6", ConsumerDispute, "Credit Not Processed"),
    ("13.7", ConsumerDispute, "Cancelled Merchandise/Services"),
    ("13.8", ConsumerDispute, "Original Credit Transaction Not Accepted"),
    ("13.9", ConsumerDispute, "Non-Receipt of Cash or Load Transaction Value"),
];

static MASTERCARD: &[(&str, ReasonCategory, &str)] = &[
    ("4808", Authorization, "Authorization-Related Chargeback"),
    ("4812", ProcessingError, "Account Number Not on File"),
    ("4831", ProcessingError, "Transaction Amount Differs"),
    ("4834", ProcessingError, "Point-of-Interaction Error"),
    ("4837", Fraud, "No Cardholder Authorization"),
    ("4840", Fraud, "Fraudulent Processing of Transactions"),
    ("4841", ConsumerDispute, "Cancelled Recurring or Digital Goods Transactions"),
    ("4842", ProcessingError, "Late Presentment"),
    ("4849", Fraud, "Questionable Merchant Activity"),
    ("4853", ConsumerDispute, "Cardholder Dispute"),
    ("4854", ConsumerDispute, "Cardholder Dispute - Not Elsewhere Classified"),
    ("4855", ConsumerDispute, "Goods or Services Not Provided"),
    ("4859", ConsumerDispute, "Addendum, No-show, or ATM Dispute"),
    ("4860", ConsumerDispute, "Credit Not Processed"),
    ("4863", Fraud, "Cardholder Does Not Recognize - Potential Fraud"),
    ("4870", Fraud, "Chip Liability Shift"),
    ("4871", Fraud, "Chip/PIN Liability Shift"),
];

static AMEX: &[(&str, ReasonCategory, &str)] = &[
    ("A01", Authorization, "Charge Amount Exceeds Authorization Amount"),
    ("A02", Authorization, "No Valid Authorization"),
    ("A08", Authorization, "Authorization Approval Expired"),
    ("C02", ConsumerDispute, "Credit Not Processed"),
    ("C04", ConsumerDispute, "Goods/Services Returned or Refused"),
    ("C05", ConsumerDispute, "Goods/Services Cancelled"),
    ("C08", ConsumerDispute, "Goods/Services Not Received or Only Partially Received"),
    ("C14", ConsumerDispute, "Paid by Other Means"),
    ("C18", ConsumerDispute, "No Show or CARDeposit Cancelled"),
    ("C28", ConsumerDispute, "Cancelled Recurring Billing"),
    ("C31", ConsumerDispute, "Goods/Services Not as Described"),
    ("C32", ConsumerDispute, "Goods/Services Damaged or Defective"),
    ("F10", Fraud, "Missing Imprint"),
    ("F14", Fraud, "Missing Signature"),
    ("F24", Fraud, "No Cardmember Authorization"),
    ("F29", Fraud, "Card Not Present"),
    ("F30", Fraud, "EMV Counterfeit"),
    ("F31", Fraud, "EMV Lost/Stolen/Non-Received"),
    ("FR2", Fraud, "Fraud Full Recourse Program"),
    ("FR4", Fraud, "Immediate Chargeback Program"),
    ("FR6", Fraud, "Partial Immediate Chargeback Program"),
    ("P01", ProcessingError, "Unassigned Card Number"),
    ("P03", ProcessingError, "Credit Processed as Charge"),
    ("P04", ProcessingError, "Charge Processed as Credit"),
    ("P05", ProcessingError, "Incorrect Charge Amount"),
    ("P07", ProcessingError, "Late Submission"),
    ("P08", ProcessingError, "Duplicate Charge"),
    ("P22", ProcessingError, "Non-Matching Card Number"),
    ("P23", ProcessingError, "Currency Discrepancy"),
];

static DISCOVER: &[(&str, ReasonCategory, &str)] = &[
    ("AA", ConsumerDispute, "Does Not Recognize"),
    ("AP", ConsumerDispute, "Cancelled Recurring Transaction"),
    ("AT", Authorization, "Authorization Noncompliance"),
    ("AW", ProcessingError, "Altered Amount"),
    ("CD", ProcessingError, "Credit Posted as Card Sale"),
    ("DP", ProcessingError, "Duplicate Processing"),
    ("IC", ProcessingError, "Illegible Sales Data"),
    ("LP", ProcessingError, "Late Presentment"),
    ("NF", ConsumerDispute, "Non-Receipt of Cash from ATM"),
    ("PM", ProcessingError, "Paid by Other Means"),
    ("RG", ConsumerDispute, "Non-Receipt of Goods or Services"),
    ("RM", ConsumerDispute, "Quality Discrepancy"),
    ("RN2", ConsumerDispute, "Credit Not Received"),
    ("UA01", Fraud, "Fraud - Card Present Transaction"),
    ("UA02", Fraud, "Fraud - Card Not Present Transaction"),
    ("UA05", Fraud, "Fraud - Chip Counterfeit Transaction"),
    ("UA06", Fraud, "Fraud - Chip and PIN Transaction"),
];
