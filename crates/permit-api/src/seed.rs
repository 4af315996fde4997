//! Reference data and account bootstrap used by the `seed` and
//! `create-admin` subcommands.

use chrono::{Datelike as _, Utc};
use permit_core::{
  application::{Application, NewApplication},
  council::{Council, NewCouncil, NewPermitType, PermitType},
  role::Role,
  store::PermitStore,
  user::{NewUser, User, UserUpdate},
};
use serde_json::{Value, json};

/// What a seeding run left in the store.
#[derive(Debug)]
pub struct SeedSummary {
  pub council:      Council,
  pub permit_types: Vec<PermitType>,
  pub sample:       Option<(User, Application)>,
}

fn kapiti_permit_types() -> [(&'static str, &'static str, &'static str, Value, Value); 4] {
  [
    (
      "BUILDING",
      "Building Consent",
      "Consent for new buildings, alterations, or additions",
      json!({
        "sitePlan": true,
        "floorPlan": true,
        "structuralDetails": true,
        "drainagePlan": true,
      }),
      json!({ "baseFee": 2500, "perSquareMeter": 15, "minimumFee": 2500 }),
    ),
    (
      "RESOURCE",
      "Resource Consent",
      "Consent for land use activities and developments",
      json!({
        "sitePlan": true,
        "environmentalAssessment": true,
        "trafficImpact": true,
        "noiseAssessment": false,
      }),
      json!({ "baseFee": 3000, "perHectare": 500, "minimumFee": 3000 }),
    ),
    (
      "DEMOLITION",
      "Demolition Consent",
      "Consent for demolition of buildings or structures",
      json!({
        "sitePlan": true,
        "demolitionPlan": true,
        "wasteManagement": true,
        "safetyPlan": true,
      }),
      json!({ "baseFee": 1500, "perSquareMeter": 5, "minimumFee": 1500 }),
    ),
    (
      "FENCE",
      "Fence Consent",
      "Consent for fence construction or modification",
      json!({
        "sitePlan": true,
        "fenceSpecifications": true,
        "neighborConsent": false,
      }),
      json!({ "baseFee": 800, "perMeter": 25, "minimumFee": 800 }),
    ),
  ]
}

/// Upsert the Kapiti Coast District Council and its permit types. With
/// `with_sample`, also create a demo citizen and one submitted application.
///
/// Safe to run repeatedly; only the sample application is added each time.
pub async fn seed_reference_data<S: PermitStore>(
  store: &S,
  with_sample: bool,
) -> Result<SeedSummary, S::Error> {
  let council = store
    .upsert_council(NewCouncil {
      name:    "Kapiti Coast District Council".into(),
      code:    "KCDC".into(),
      country: "NZ".into(),
      region:  Some("Wellington".into()),
    })
    .await?;
  tracing::info!(council = %council.name, "seeded council");

  let mut permit_types = Vec::new();
  for (code, name, description, requirements, fees) in kapiti_permit_types() {
    let permit_type = store
      .upsert_permit_type(NewPermitType {
        council_id: council.id,
        name: name.into(),
        code: code.into(),
        description: Some(description.into()),
        requirements,
        fees,
        is_active: true,
      })
      .await?;
    tracing::info!(permit_type = %permit_type.name, "seeded permit type");
    permit_types.push(permit_type);
  }

  let sample = if with_sample {
    Some(seed_sample(store, &council, &permit_types[0]).await?)
  } else {
    None
  };

  Ok(SeedSummary { council, permit_types, sample })
}

async fn seed_sample<S: PermitStore>(
  store: &S,
  council: &Council,
  building: &PermitType,
) -> Result<(User, Application), S::Error> {
  const EMAIL: &str = "test@example.com";

  let user = match store.find_user_by_email(EMAIL).await? {
    Some(user) => user,
    None => {
      store
        .create_user(NewUser {
          email:         EMAIL.into(),
          password_hash: None,
          first_name:    "John".into(),
          last_name:     "Doe".into(),
          phone:         Some("+64 21 123 4567".into()),
          address:       Some(json!({
            "street": "123 Main Street",
            "city": "Paraparaumu",
            "postalCode": "5032",
            "region": "Wellington",
            "country": "NZ",
          })),
          role:          Role::Citizen,
        })
        .await?
    }
  };

  let application = store
    .submit_application(
      NewApplication {
        user_id:        user.id,
        council_id:     council.id,
        permit_type_id: building.id,
        data:           json!({
          "applicant": {
            "firstName": "John",
            "lastName": "Doe",
            "email": EMAIL,
            "phone": "+64 21 123 4567",
          },
          "property": {
            "address": "123 Main Street, Paraparaumu",
            "legalDescription": "Lot 1 DP 123456",
            "zone": "Residential",
          },
          "project": {
            "type": "New dwelling",
            "description": "Construction of a 3-bedroom house with attached garage",
            "estimatedValue": 450000,
            "floorArea": 180,
          },
          "documents": ["site-plan.pdf", "floor-plan.pdf", "structural-details.pdf"],
        }),
      },
      Utc::now().year(),
    )
    .await?;
  tracing::info!(reference = %application.reference, "seeded sample application");

  Ok((user, application))
}

/// Create an active admin account, or promote and re-key an existing one.
pub async fn ensure_admin<S: PermitStore>(
  store: &S,
  email: &str,
  first_name: &str,
  last_name: &str,
  password_hash: String,
) -> Result<User, S::Error> {
  let email = email.trim().to_lowercase();

  if let Some(existing) = store.find_user_by_email(&email).await? {
    let update = UserUpdate {
      role: Some(Role::Admin),
      is_active: Some(true),
      password_hash: Some(password_hash.clone()),
      ..UserUpdate::default()
    };
    match store.update_user(existing.id, update).await? {
      Some(user) => {
        tracing::info!(user_id = %user.id, "promoted existing user to admin");
        return Ok(user);
      }
      // Deleted between the lookup and the update; create it afresh.
      None => tracing::warn!(user_id = %existing.id, "user vanished before promotion"),
    }
  }

  let user = store
    .create_user(NewUser {
      email,
      password_hash: Some(password_hash),
      first_name: first_name.into(),
      last_name: last_name.into(),
      phone: None,
      address: None,
      role: Role::Admin,
    })
    .await?;
  tracing::info!(user_id = %user.id, "created admin");
  Ok(user)
}
